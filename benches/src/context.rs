use rand::Rng;

#[derive(serde::Serialize)]
pub struct Context {
    pub title: String,
    pub users: Vec<User>,
}

#[derive(serde::Serialize)]
pub struct User {
    pub name: String,
    pub age: u32,
    pub is_disabled: bool,
    pub tags: Vec<String>,
}

pub fn random(n: usize) -> Context {
    let mut rng = rand::thread_rng();
    let title = word(&mut rng, 20);
    let users = (0..n)
        .map(|_| User {
            name: word(&mut rng, 20),
            age: rng.gen_range(21..100),
            is_disabled: rng.gen_ratio(1, 4),
            tags: (0..3).map(|_| word(&mut rng, 6)).collect(),
        })
        .collect();
    Context { title, users }
}

fn word(rng: &mut impl Rng, len: usize) -> String {
    (0..len).map(|_| rng.gen_range('a'..='z')).collect()
}
