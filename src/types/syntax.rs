/// The template syntax configuration.
///
/// Use [`Syntax::default()`] to get the default syntax configuration and
/// [`Syntax::builder()`] to create a custom syntax configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub(crate) left: String,
    pub(crate) right: String,
}

/// A builder for the syntax configuration.
///
/// This struct is typically created using [`Syntax::builder()`].
#[derive(Debug, Clone)]
pub struct SyntaxBuilder {
    left: String,
    right: String,
}

impl Default for Syntax {
    /// Returns the default syntax configuration.
    ///
    /// This is equivalent to the following.
    /// ```
    /// use stencil::Syntax;
    ///
    /// let syntax = Syntax::builder().delims("{{", "}}").build();
    /// assert_eq!(syntax, Syntax::default());
    /// ```
    #[inline]
    fn default() -> Self {
        Syntax::builder().build()
    }
}

impl Syntax {
    /// Create a new syntax builder.
    ///
    /// # Examples
    ///
    /// ```
    /// let syntax = stencil::Syntax::builder().delims("<%", "%>").build();
    /// ```
    #[inline]
    pub fn builder() -> SyntaxBuilder {
        SyntaxBuilder::new()
    }

    /// The action delimiters.
    pub fn delims(&self) -> (&str, &str) {
        (&self.left, &self.right)
    }
}

impl SyntaxBuilder {
    /// Creates a new syntax builder with the default `{{` and `}}`
    /// delimiters.
    #[inline]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            left: "{{".into(),
            right: "}}".into(),
        }
    }

    /// Set the action delimiters.
    ///
    /// Comments are written inside the delimiters, e.g. `<%/* note */%>`.
    ///
    /// # Panics
    ///
    /// If either of the strings are empty.
    #[inline]
    pub fn delims(&mut self, left: &str, right: &str) -> &mut Self {
        assert!(!left.is_empty() && !right.is_empty());
        self.left = left.into();
        self.right = right.into();
        self
    }

    /// Builds the syntax configuration.
    pub fn build(&self) -> Syntax {
        Syntax {
            left: self.left.clone(),
            right: self.right.clone(),
        }
    }
}
