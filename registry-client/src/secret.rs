//! A string wrapper that never leaks its contents through `Debug`/`Display`.
//!
//! Mirrors `pydantic.SecretStr` in the original implementation: the value is
//! only ever read back out via [`Secret::expose`], and that call site is the
//! subprocess-argv boundary in [`crate::client`].

use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: String) -> Self {
        Secret(value)
    }

    /// Returns the wrapped value. Callers must not place the result in a log
    /// line or error message.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_prints_the_value() {
        let secret = Secret::new("hunter2".to_string());
        assert_eq!(format!("{:?}", secret), "Secret(<redacted>)");
        assert_eq!(format!("{}", secret), "<redacted>");
        assert_eq!(secret.expose(), "hunter2");
    }
}
