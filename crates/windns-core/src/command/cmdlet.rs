//! Parameterized cmdlet invocations
//!
//! Values are always emitted as single-quoted PowerShell literals, so zone names,
//! record names and record data can never terminate the literal or inject statements.

use std::fmt;

/// Quote `value` as a single-quoted PowerShell string literal.
///
/// Inside single quotes PowerShell expands nothing; the only escape is a doubled quote.
/// The typographic single quotes are treated as quote characters by PowerShell and are
/// doubled as well.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}

#[derive(Debug, Clone)]
enum Param {
    Literal(&'static str, String),
    Variable(&'static str, &'static str),
    Switch(&'static str),
    Raw(&'static str),
}

/// One cmdlet call with named parameters
#[derive(Debug, Clone)]
pub struct Cmdlet {
    name: &'static str,
    params: Vec<Param>,
}

impl Cmdlet {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: Vec::new(),
        }
    }

    /// `-name 'value'`
    pub fn arg(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push(Param::Literal(name, value.into()));
        self
    }

    /// `-name 'value'` when `value` is present
    pub fn arg_opt(self, name: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.arg(name, v),
            None => self,
        }
    }

    /// `-name $variable`
    pub fn var(mut self, name: &'static str, variable: &'static str) -> Self {
        self.params.push(Param::Variable(name, variable));
        self
    }

    /// `-name`
    pub fn switch(mut self, name: &'static str) -> Self {
        self.params.push(Param::Switch(name));
        self
    }

    /// `-name` when `enabled`
    pub fn switch_if(self, name: &'static str, enabled: bool) -> Self {
        if enabled { self.switch(name) } else { self }
    }

    /// A fixed trailing token such as `-Confirm:$false`
    pub fn raw(mut self, token: &'static str) -> Self {
        self.params.push(Param::Raw(token));
        self
    }
}

impl fmt::Display for Cmdlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for param in &self.params {
            match param {
                Param::Literal(name, value) => write!(f, " -{} {}", name, quote(value))?,
                Param::Variable(name, variable) => write!(f, " -{} ${}", name, variable)?,
                Param::Switch(name) => write!(f, " -{}", name)?,
                Param::Raw(token) => write!(f, " {}", token)?,
            }
        }
        Ok(())
    }
}
