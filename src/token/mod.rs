//! Signed start tokens: issuance, verification, and match-start authorization

pub mod authorizer;
pub mod codec;

pub use authorizer::{StartAuthorizer, StartDenial, VerifyStartRequest};
pub use codec::{IssuedToken, TokenCodec, TokenPayload, TOKEN_VERSION};
