//! Scoped environment variables for configuration tests.
//!
//! Tests touching the environment must run under `#[serial_test::serial]`;
//! the process environment is shared between test threads.

/// Sets or removes a variable and restores the previous state on drop.
#[derive(Debug)]
pub struct EnvVarGuard {
    key: String,
    original: Option<String>,
}

impl EnvVarGuard {
    /// Set `key` to `value` for the lifetime of the guard.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use test_support::EnvVarGuard;
    ///
    /// {
    ///     let _guard = EnvVarGuard::set("IPMESHD_DOC_EXAMPLE", "1");
    ///     assert_eq!(std::env::var("IPMESHD_DOC_EXAMPLE").as_deref(), Ok("1"));
    /// }
    /// assert!(std::env::var("IPMESHD_DOC_EXAMPLE").is_err());
    /// ```
    #[must_use]
    pub fn set(key: &str, value: &str) -> Self {
        let guard = Self::capture(key);
        set_env_var(key, value);
        guard
    }

    /// Unset `key` for the lifetime of the guard.
    #[must_use]
    pub fn remove(key: &str) -> Self {
        let guard = Self::capture(key);
        remove_env_var(key);
        guard
    }

    fn capture(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            original: std::env::var(key).ok(),
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.original {
            Some(value) => set_env_var(&self.key, value),
            None => remove_env_var(&self.key),
        }
    }
}

// SAFETY for both helpers: callers run serially, see the module docs.
fn set_env_var(key: &str, value: &str) {
    unsafe { std::env::set_var(key, value) };
}

fn remove_env_var(key: &str) {
    unsafe { std::env::remove_var(key) };
}
