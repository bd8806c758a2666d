use rand::distributions::{Alphanumeric, DistString};
use std::fmt::{Debug, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A type with the ability to generate random tokens, used for session ids and CSRF tokens.
///
/// Generated tokens must be valid HTTP cookie values and header values.
pub trait TokenGenerator: Debug + Send + Sync {
    /// Generate a new token.
    fn generate(&self) -> String;
}

/// The default token generator with focus on security.
/// It uses [`rand::thread_rng`] as a random source and the [`Alphanumeric`] distribution to generate token strings.
/// This gives `log_2(26+26+10) ≥ 5.95` bits of entropy per character,
/// so the default length of 32 characters carries more than 190 bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokenGenerator<const TOKEN_LENGTH: usize = 32>;

impl<const TOKEN_LENGTH: usize> TokenGenerator for RandomTokenGenerator<TOKEN_LENGTH> {
    fn generate(&self) -> String {
        let mut token = String::with_capacity(TOKEN_LENGTH);
        Alphanumeric.append_string(&mut rand::thread_rng(), &mut token, TOKEN_LENGTH);
        token
    }
}

/// A debug token generator that generates an ascending sequence of integers, formatted as strings padded with zeroes.
///
/// **Never use this outside of tests**, the generated tokens are trivially guessable.
#[derive(Debug, Default)]
pub struct SequentialTokenGenerator<const TOKEN_LENGTH: usize = 32> {
    next_index: AtomicUsize,
}

impl<const TOKEN_LENGTH: usize> TokenGenerator for SequentialTokenGenerator<TOKEN_LENGTH> {
    fn generate(&self) -> String {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let mut token = String::with_capacity(TOKEN_LENGTH);
        // Writing to a String cannot fail.
        let _ = write!(&mut token, "{index:0width$}", width = TOKEN_LENGTH);
        token
    }
}
