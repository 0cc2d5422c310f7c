//! Auth token supply.

use parking_lot::RwLock;

/// Supplies the bearer token for each request.
///
/// Returning `None` aborts a sync run before any entry is touched.
pub trait TokenProvider: Send + Sync {
    /// The current token, if the user is signed in.
    fn token(&self) -> Option<String>;
}

/// A token held in memory and replaced on login/logout.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: RwLock<Option<String>>,
}

impl StaticToken {
    /// Creates a provider holding `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Creates a provider with no token.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replaces the token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Forgets the token.
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.token.read().clone().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_logout() {
        let tokens = StaticToken::signed_out();
        assert_eq!(tokens.token(), None);
        tokens.set("abc");
        assert_eq!(tokens.token().as_deref(), Some("abc"));
        tokens.clear();
        assert_eq!(tokens.token(), None);
    }

    #[test]
    fn empty_token_counts_as_missing() {
        assert_eq!(StaticToken::new("").token(), None);
    }
}
