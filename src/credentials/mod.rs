//! Tenant credential records, the credential store boundary, and the
//! encryption service boundary.
//!
//! Persistence and encryption are external collaborators: this crate only
//! defines the traits it consumes plus reference implementations
//! (in-memory store, AES-256-GCM cipher) so it is runnable and testable on
//! its own.

mod cipher;
mod records;
mod store;

pub use cipher::{AesGcmCipher, Cipher};
pub use records::{AuthMode, CredentialPatch, TenantCredential, TenantWebhookState};
pub use store::{CredentialStore, MemoryCredentialStore};
