pub mod access_grant;
pub mod access_token;
pub mod auth_request;
pub mod client;

pub use access_grant::Entity as AccessGrant;
pub use access_token::Entity as AccessToken;
pub use auth_request::Entity as AuthRequest;
pub use client::Entity as Client;
