use crate::db::credential::Secret;
use rand::{Rng, distr::Alphanumeric};

/// Produces passwords for roles created without one.
pub trait SecretGenerator: Send + Sync {
    fn generate(&self) -> Secret;
}

/// Alphanumeric passwords from the thread-local RNG.
pub struct RandomPassword {
    length: usize,
}

impl RandomPassword {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(8),
        }
    }
}

impl SecretGenerator for RandomPassword {
    fn generate(&self) -> Secret {
        let password: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();
        Secret::new(password)
    }
}
