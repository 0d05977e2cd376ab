//! Macro environment derived from compiler flags.

use std::collections::BTreeMap;

use crate::error::{BufferError, Result};

/// Value of a single macro definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MacroValue {
    /// `-DNAME` without a value.
    Defined,
    /// `-DNAME=VALUE`
    Value(String),
}

impl MacroValue {
    /// Text of the value; defined-only macros read as `1`, like a compiler does.
    pub fn as_text(&self) -> &str {
        match self {
            MacroValue::Defined => "1",
            MacroValue::Value(value) => value,
        }
    }
}

/// The set of active macro definitions for one scanner run.
///
/// Ordered so iteration (and anything derived from it, such as the
/// staleness fingerprint) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MacroEnvironment {
    macros: BTreeMap<String, MacroValue>,
}

impl MacroEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an environment from compiler-style definitions.
    ///
    /// Accepts `-DNAME`, `-DNAME=VALUE`, `NAME`, `NAME=VALUE` and `-UNAME`.
    pub fn from_flags<I, S>(flags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut env = Self::new();
        for flag in flags {
            env.apply_flag(flag.as_ref())?;
        }
        Ok(env)
    }

    /// Apply a single `-D`/`-U` style flag.
    pub fn apply_flag(&mut self, flag: &str) -> Result<()> {
        let flag = flag.trim();
        if let Some(name) = flag.strip_prefix("-U") {
            check_name(name)?;
            self.undefine(name);
            return Ok(());
        }

        let definition = flag.strip_prefix("-D").unwrap_or(flag);
        match definition.split_once('=') {
            Some((name, value)) => {
                check_name(name)?;
                self.define(name, value);
            }
            None => {
                check_name(definition)?;
                self.define_flag(definition);
            }
        }
        Ok(())
    }

    /// Define `name` with a value.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.macros
            .insert(name.into(), MacroValue::Value(value.into()));
    }

    /// Define `name` without a value.
    pub fn define_flag(&mut self, name: impl Into<String>) {
        self.macros.insert(name.into(), MacroValue::Defined);
    }

    pub fn undefine(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&MacroValue> {
        self.macros.get(name)
    }

    /// Layer `other` on top of this environment; its definitions win.
    pub fn merged(mut self, other: &MacroEnvironment) -> Self {
        for (name, value) in &other.macros {
            self.macros.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MacroValue)> {
        self.macros.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Replace `${NAME}` placeholders with macro values.
    pub fn substitute(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| BufferError::InvalidDeclaration {
                origin: Default::default(),
                message: format!("unclosed placeholder in '{}'", text),
                help: Some("Placeholders have the form ${NAME}".to_string()),
            })?;
            let name = &after[..end];
            let value = self.get(name).ok_or_else(|| BufferError::InvalidDeclaration {
                origin: Default::default(),
                message: format!("placeholder ${{{}}} names an undefined macro", name),
                help: Some(format!("Pass -D{}=<value>", name)),
            })?;
            out.push_str(value.as_text());
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

fn check_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(BufferError::Config {
            message: format!("invalid macro name '{}'", name),
            help: Some("Use -DNAME or -DNAME=VALUE".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let env = MacroEnvironment::from_flags(["-DFEATURE", "-DLEVEL=3", "PLAIN=x"]).unwrap();

        assert_eq!(env.get("FEATURE"), Some(&MacroValue::Defined));
        assert_eq!(env.get("LEVEL"), Some(&MacroValue::Value("3".to_string())));
        assert_eq!(env.get("PLAIN"), Some(&MacroValue::Value("x".to_string())));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_undefine_flag() {
        let env = MacroEnvironment::from_flags(["-DA", "-UA"]).unwrap();
        assert!(!env.is_defined("A"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        assert!(MacroEnvironment::from_flags(["-D1ABC"]).is_err());
        assert!(MacroEnvironment::from_flags(["-D"]).is_err());
    }

    #[test]
    fn test_empty_value_is_still_a_value() {
        let env = MacroEnvironment::from_flags(["-DEMPTY="]).unwrap();
        assert_eq!(env.get("EMPTY"), Some(&MacroValue::Value(String::new())));
    }

    #[test]
    fn test_merged_overrides() {
        let base = MacroEnvironment::from_flags(["A=1", "B=2"]).unwrap();
        let top = MacroEnvironment::from_flags(["B=3"]).unwrap();
        let env = base.merged(&top);
        assert_eq!(env.get("A").unwrap().as_text(), "1");
        assert_eq!(env.get("B").unwrap().as_text(), "3");
    }

    #[test]
    fn test_substitute() {
        let env = MacroEnvironment::from_flags(["BOARD=rev2", "-DFLAG"]).unwrap();
        assert_eq!(
            env.substitute("assets/${BOARD}/logo.png").unwrap(),
            "assets/rev2/logo.png"
        );
        assert_eq!(env.substitute("${FLAG}").unwrap(), "1");
        assert_eq!(env.substitute("no placeholders").unwrap(), "no placeholders");
    }

    #[test]
    fn test_substitute_errors() {
        let env = MacroEnvironment::new();
        assert!(env.substitute("${MISSING}").is_err());
        assert!(env.substitute("${OPEN").is_err());
    }
}
