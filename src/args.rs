/// An ordered accumulator for command-line tokens.
///
/// Every higher-level builder in this crate lowers itself through an
/// [`ArgList`]; tokens come out of [`ArgList::build`] in exactly the order
/// they were appended, which is what makes the produced command lines
/// reproducible. ffmpeg is order-sensitive for several flags (`-ss`/`-t`
/// must precede the `-i` they apply to, filters must follow codecs), so
/// nothing here ever reorders.
#[derive(Debug, Default)]
pub struct ArgList {
    tokens: Vec<String>,
}

impl ArgList {
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Appends a single token.
    pub fn add(&mut self, token: impl Into<String>) -> &mut Self {
        self.tokens.push(token.into());
        self
    }

    /// Appends a `key value` flag pair.
    pub fn add_pair(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.tokens.push(key.into());
        self.tokens.push(value.into());
        self
    }

    /// Appends a flag pair only when `condition` holds.
    pub fn add_arg_if(
        &mut self,
        condition: bool,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        if condition {
            self.add_pair(key, value);
        }
        self
    }

    /// Appends a flag pair only when `condition` holds, computing the value
    /// lazily. The supplier is not evaluated when the flag is suppressed.
    pub fn add_arg_with<F, V>(&mut self, condition: bool, key: impl Into<String>, value: F) -> &mut Self
    where
        F: FnOnce() -> V,
        V: Into<String>,
    {
        if condition {
            self.add_pair(key, value());
        }
        self
    }

    /// Appends a single bare flag only when `condition` holds.
    pub fn add_flag_if(&mut self, condition: bool, flag: impl Into<String>) -> &mut Self {
        if condition {
            self.add(flag);
        }
        self
    }

    /// Appends every token from `values`, in iteration order.
    pub fn add_all<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.tokens.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns a frozen, order-preserving copy of the accumulated tokens.
    pub fn build(&self) -> Vec<String> {
        self.tokens.clone()
    }

    /// Consumes the accumulator, returning the tokens without a copy.
    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}
