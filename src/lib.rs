//! A bytecode compiler, optimizer and pooled interpreter for Go-style text
//! templates.
//!
//! # Features
//!
//! ### Syntax
//!
//! - Actions: `{{ .User.Name }}`, `{{ $x := .Count }}`, `{{ .Name | print }}`
//! - Conditionals: `{{ if .Enabled }} ... {{ else if .Other }} ... {{ end }}`
//! - Scoped dot: `{{ with .User }} ... {{ else }} ... {{ end }}`
//! - Loops over lists, maps, channels and integers:
//!   `{{ range $i, $e := .Items }} ... {{ else }} ... {{ end }}`
//! - Nested templates: `{{ define "row" }} ... {{ end }}`,
//!   `{{ template "row" . }}` and `{{ block "row" . }} ... {{ end }}`
//! - Comments and whitespace trimming: `{{- /* comment */ -}}`
//! - Configurable delimiters: `<% .User.Name %>`
//!
//! ### Engine
//!
//! - Templates compile to a compact linear bytecode, see [`Program`]
//! - An optimizer removes dead invocations and fuses literal output
//! - Rendering reuses interpreter state from a lock-free [`Pool`], so a
//!   template can be rendered from many threads at once
//! - HTML escaper calls that can't change the output are dropped at compile
//!   time
//! - Render to a [`String`] or any [`std::io::Write`] implementor
//! - Render using any [`serde`] serializable values
//! - Convenient macro for quick rendering:
//!   `stencil::value!{ Name: "John", Age: 42 }`
//!
//! # Getting started
//!
//! Your entry point is the [`Engine`] struct. The engine stores the syntax
//! config, functions, and compiled templates. Generally, you only need to
//! construct one engine during the lifetime of a program.
//!
//! ```
//! let engine = stencil::Engine::new();
//! ```
//!
//! Next, [`.add_template`][Engine::add_template] is used to compile and store
//! a template in the engine.
//!
//! ```
//! # let mut engine = stencil::Engine::new();
//! engine.add_template("hello", "Hello {{ .User.Name }}!")?;
//! # Ok::<(), stencil::Error>(())
//! ```
//!
//! Finally, the template is rendered by fetching it using
//! [`.get_template`][Engine::get_template] and calling
//! [`.render`][TemplateRef::render].
//!
//! ```
//! # let mut engine = stencil::Engine::new();
//! # engine.add_template("hello", "Hello {{ .User.Name }}!")?;
//! let template = engine.get_template("hello").unwrap();
//! let result = template.render(stencil::value!{ User: { Name: "John Smith" }})?;
//! assert_eq!(result, "Hello John Smith!");
//! # Ok::<(), stencil::Error>(())
//! ```
//!
//! If you don't need to store the compiled template then you can also use
//! the [`.compile`][Engine::compile] function to return the template
//! directly.
//!
//! ```
//! # let engine = stencil::Engine::new();
//! let template = engine.compile("Hello {{ .User.Name }}!")?;
//! let result = template.render(stencil::value!{ User: { Name: "John Smith" }})?;
//! assert_eq!(result, "Hello John Smith!");
//! # Ok::<(), stencil::Error>(())
//! ```
//!
//! # Examples
//!
//! ### Render using structured data
//!
//! ```
//! #[derive(serde::Serialize)]
//! struct Context { items: Vec<Item> }
//!
//! #[derive(serde::Serialize)]
//! struct Item { name: String, price: i64 }
//!
//! let ctx = Context {
//!     items: vec![
//!         Item { name: "tea".into(), price: 3 },
//!         Item { name: "cake".into(), price: 5 },
//!     ],
//! };
//!
//! let result = stencil::Engine::new()
//!     .compile("{{ range .items }}{{ .name }}: {{ .price }}\n{{ end }}")?
//!     .render(&ctx)?;
//!
//! assert_eq!(result, "tea: 3\ncake: 5\n");
//! # Ok::<(), stencil::Error>(())
//! ```
//!
//! ### Call functions
//!
//! Functions are resolved by name when a template is compiled. The piped
//! value is passed as the last argument.
//!
//! ```
//! let mut engine = stencil::Engine::new();
//! engine.add_function("lower", |s: String| s.to_lowercase());
//!
//! let result = engine
//!     .compile("Hello {{ .value | lower }}")?
//!     .render(stencil::value! { value: "WORLD!" })?;
//!
//! assert_eq!(result, "Hello world!");
//! # Ok::<(), stencil::Error>(())
//! ```
//!
//! See the [`Function`] trait documentation for more information.
//!
//! ### Render a template using custom syntax
//!
//! ```
//! let syntax = stencil::Syntax::builder().delims("<%", "%>").build();
//!
//! let result = stencil::Engine::with_syntax(syntax)
//!     .compile("Hello <% .user %>")?
//!     .render(stencil::value!{ user: "John Smith" })?;
//!
//! assert_eq!(result, "Hello John Smith");
//! # Ok::<(), stencil::Error>(())
//! ```
//!
//! ### Render a template to an `impl io::Write`
//!
//! ```
//! use std::io;
//!
//! let stdout = io::BufWriter::new(io::stdout());
//!
//! stencil::Engine::new()
//!     .compile("Hello {{ .user }}")?
//!     .render_to_writer(stdout, stencil::value! { user: "John Smith" })?;
//! #
//! # Ok::<(), stencil::Error>(())
//! ```
//!
//! ### Inspect the compiled program
//!
//! ```
//! let engine = stencil::Engine::new();
//! let template = engine.compile("a{{ if . }}b{{ end }}c")?;
//! print!("{}", template.program().disassemble("").unwrap());
//! # Ok::<(), stencil::Error>(())
//! ```

mod compile;
mod error;
mod funcs;
mod macros;
mod optimize;
mod render;
mod types;
mod value;

use std::collections::BTreeMap;
use std::fmt;
use std::io;

pub use crate::compile::{compile, forest, parse};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::funcs::escape::escape_html;
pub use crate::funcs::{
    CallError, FuncArg, FuncArgs, FuncReturn, Function, Registry, ReturnKind, ATTR_ESCAPER,
    HTML_ESCAPER,
};
pub use crate::optimize::optimize;
pub use crate::render::{execute, Interpreter, Pool, DEFAULT_MAX_CALL_DEPTH};
pub use crate::types::program::{decode, encode, Instr, Op, Program};
pub use crate::types::span::Span;
pub use crate::types::syntax::{Syntax, SyntaxBuilder};
pub use crate::types::tree;
#[cfg(feature = "serde")]
pub use crate::value::to_value;
pub use crate::value::{FieldLookup, Map, MethodLookup, Object, Value};

use crate::types::tree::Tree;

/// The compilation and rendering engine.
pub struct Engine {
    syntax: Syntax,
    registry: Registry,
    /// Every parsed tree by name, including `define`d ones.
    trees: BTreeMap<String, Tree>,
    templates: BTreeMap<String, Program>,
    pool: Pool,
    max_call_depth: usize,
    optimize: bool,
}

/// A compiled template.
pub struct Template<'engine> {
    engine: &'engine Engine,
    program: Program,
}

/// A reference to a compiled template in an [`Engine`].
#[derive(Clone, Copy)]
pub struct TemplateRef<'engine> {
    engine: &'engine Engine,
    program: &'engine Program,
}

impl Default for Engine {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Construct a new engine.
    ///
    /// With the `builtins` feature the engine has all the builtin functions.
    #[inline]
    pub fn new() -> Self {
        Self::with_syntax(Syntax::default())
    }

    /// Construct a new engine with custom syntax.
    ///
    /// # Examples
    ///
    /// ```
    /// use stencil::{Engine, Syntax};
    ///
    /// let syntax = Syntax::builder().delims("<{", "}>").build();
    /// let engine = Engine::with_syntax(syntax);
    /// ```
    #[inline]
    pub fn with_syntax(syntax: Syntax) -> Self {
        Self {
            syntax,
            registry: Registry::with_builtins(),
            trees: BTreeMap::new(),
            templates: BTreeMap::new(),
            pool: Pool::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            optimize: true,
        }
    }

    /// Add a new function to the engine.
    ///
    /// Functions are resolved when a template is compiled, so they must be
    /// added before any template using them.
    #[inline]
    pub fn add_function<F, R, A>(&mut self, name: impl Into<String>, f: F)
    where
        F: Function<R, A> + Send + Sync + 'static,
        R: FuncReturn,
        A: FuncArgs,
    {
        self.registry.add(name, f);
    }

    /// Add a new function taking at least `min` arguments.
    #[inline]
    pub fn add_variadic_function<F, R>(&mut self, name: impl Into<String>, min: usize, f: F)
    where
        F: Fn(Vec<Value>) -> R + Send + Sync + 'static,
        R: FuncReturn,
    {
        self.registry.add_variadic(name, min, f);
    }

    /// Declare the kind of value a function returns.
    ///
    /// Returns `false` if there is no such function.
    #[inline]
    pub fn set_return_kind(&mut self, name: &str, kind: ReturnKind) -> bool {
        self.registry.set_return_kind(name, kind)
    }

    /// Set the maximum number of nested `{{ template }}` invocations.
    ///
    /// Defaults to 64.
    #[inline]
    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    /// Set whether compiled templates are optimized.
    ///
    /// Defaults to `true`.
    #[inline]
    pub fn set_optimize(&mut self, optimize: bool) {
        self.optimize = optimize;
    }

    /// Set the number of idle interpreter states and output buffers kept
    /// for reuse, zero disables pooling.
    ///
    /// Defaults to 16.
    pub fn set_pool_capacity(&mut self, capacity: usize) {
        self.pool = Pool::new(capacity);
    }

    /// Add a template to the engine.
    ///
    /// The template and every template it defines are stored under their
    /// names, a definition replaces a stored tree with the same name. The
    /// template is then compiled together with every template it can invoke,
    /// so those must have been added before.
    pub fn add_template(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        let name = name.into();
        let mut trees = self.trees.clone();
        for tree in compile::parse(&self.syntax, &name, source)? {
            trees.insert(tree.name.clone(), tree);
        }
        let program = self.build(&name, &trees)?;
        self.trees = trees;
        self.templates.insert(name, program);
        Ok(())
    }

    /// Lookup a template by name.
    #[inline]
    pub fn get_template(&self, name: &str) -> Option<TemplateRef<'_>> {
        self.templates.get(name).map(|program| TemplateRef {
            engine: self,
            program,
        })
    }

    /// Remove a template from the engine.
    ///
    /// Programs already compiled from it are not affected.
    pub fn remove_template(&mut self, name: &str) -> bool {
        self.trees.remove(name);
        self.templates.remove(name).is_some()
    }

    /// Compile a template.
    ///
    /// The template will not be stored in the engine. It can invoke any
    /// template added to the engine.
    pub fn compile(&self, source: &str) -> Result<Template<'_>> {
        let mut trees = self.trees.clone();
        for tree in compile::parse(&self.syntax, "", source)? {
            trees.insert(tree.name.clone(), tree);
        }
        let program = self.build("", &trees)?;
        Ok(Template {
            engine: self,
            program,
        })
    }

    fn build(&self, root: &str, trees: &BTreeMap<String, Tree>) -> Result<Program> {
        let forest = compile::forest(root, trees);
        let mut program = compile::compile(&forest, &self.registry)?;
        if self.optimize {
            optimize::optimize(&mut program);
        }
        Ok(program)
    }

    fn interpreter<'a>(&'a self, program: &'a Program) -> Interpreter<'a> {
        Interpreter::new(program, &self.pool).with_max_call_depth(self.max_call_depth)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("syntax", &self.syntax)
            .field("templates", &self.templates.keys())
            .field("pool", &self.pool)
            .field("max_call_depth", &self.max_call_depth)
            .field("optimize", &self.optimize)
            .finish_non_exhaustive()
    }
}

macro_rules! impl_render {
    ($program:ident) => {
        /// Render the template to a string using the provided value.
        #[cfg(feature = "serde")]
        #[inline]
        pub fn render<S>(&self, ctx: S) -> Result<String>
        where
            S: serde::Serialize,
        {
            self.render_from(to_value(ctx)?)
        }

        /// Render the template to a string using the provided [`Value`].
        pub fn render_from(&self, value: Value) -> Result<String> {
            let program = self.$program();
            self.engine
                .interpreter(program)
                .execute_to_string(program.root(), value)
        }

        /// Render the template to a writer using the provided value.
        #[cfg(feature = "serde")]
        #[inline]
        pub fn render_to_writer<W, S>(&self, writer: W, ctx: S) -> Result<()>
        where
            W: io::Write,
            S: serde::Serialize,
        {
            self.render_from_to_writer(writer, to_value(ctx)?)
        }

        /// Render the template to a writer using the provided [`Value`].
        pub fn render_from_to_writer<W>(&self, mut writer: W, value: Value) -> Result<()>
        where
            W: io::Write,
        {
            let program = self.$program();
            self.engine
                .interpreter(program)
                .execute(program.root(), value, &mut writer)
        }
    };
}

impl<'engine> Template<'engine> {
    impl_render!(program);

    /// Returns the compiled program.
    #[inline]
    pub fn program(&self) -> &Program {
        &self.program
    }
}

impl fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl<'engine> TemplateRef<'engine> {
    impl_render!(program);

    /// Returns the compiled program.
    #[inline]
    pub fn program(&self) -> &'engine Program {
        self.program
    }

    /// Returns the name of the template.
    #[inline]
    pub fn name(&self) -> &'engine str {
        self.program.root()
    }
}

impl fmt::Debug for TemplateRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRef")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}
