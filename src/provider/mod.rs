pub mod factory;
pub mod token_provider;

pub use factory::CredentialFactory;
pub use token_provider::TokenProvider;
