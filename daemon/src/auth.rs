use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    Missing,
    #[error("malformed bearer credential")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// Tokens of the form `<owner>.<hex hmac-sha256(secret, owner)>`.
pub struct HmacTokenVerifier {
    keyed: HmacSha256,
}

impl HmacTokenVerifier {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(anyhow!(
                "auth.secret is empty (set auth.secret or AUTONOMY_AUTH_SECRET)"
            ));
        }
        let keyed = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|error| anyhow!("invalid auth secret: {error}"))?;
        Ok(Self { keyed })
    }

    pub fn sign(&self, owner: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(owner.as_bytes());
        format!("{owner}.{}", hex::encode(mac.finalize().into_bytes()))
    }
}

impl TokenVerifier for HmacTokenVerifier {
    fn verify(&self, token: &str) -> Result<String, AuthError> {
        let (owner, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        if owner.is_empty() {
            return Err(AuthError::Malformed);
        }
        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;
        let mut mac = self.keyed.clone();
        mac.update(owner.as_bytes());
        mac.verify_slice(&signature).map_err(|_| AuthError::BadSignature)?;
        Ok(owner.to_string())
    }
}

pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::Missing)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::Malformed)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}
