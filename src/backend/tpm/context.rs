use super::TpmError;
use std::sync::{Arc, Mutex};
use tss_esapi::attributes::ObjectAttributesBuilder;
use tss_esapi::handles::KeyHandle;
use tss_esapi::interface_types::algorithm::{HashingAlgorithm, PublicAlgorithm};
use tss_esapi::interface_types::ecc::EccCurve;
use tss_esapi::interface_types::reserved_handles::Hierarchy;
use tss_esapi::structures::{EccPoint, PublicBuilder, PublicEccParametersBuilder, SymmetricDefinitionObject};
use tss_esapi::{Context, TctiNameConf};

struct TpmContextInner {
    ctx: Mutex<Context>,
    primary: KeyHandle,
}

/// ESAPI context plus the owner-hierarchy storage primary that parents
/// every sealed key.
#[derive(Clone)]
pub struct TpmContext {
    inner: Arc<TpmContextInner>,
}

impl TpmContext {
    pub fn new(device_path: &str) -> Result<Self, TpmError> {
        let tcti_str = format!("device:{device_path}");
        let tcti = tcti_str
            .parse::<TctiNameConf>()
            .map_err(|e| TpmError::Context(e.to_string()))?;
        let mut ctx = Context::new(tcti).map_err(|e| TpmError::Context(e.to_string()))?;
        let primary = create_primary(&mut ctx)?;
        Ok(Self {
            inner: Arc::new(TpmContextInner {
                ctx: Mutex::new(ctx),
                primary,
            }),
        })
    }

    /// Run a synchronous TPM operation. Call from spawn_blocking.
    pub fn with_ctx<F, T>(&self, f: F) -> Result<T, TpmError>
    where
        F: FnOnce(&mut Context, KeyHandle) -> Result<T, TpmError>,
    {
        let mut ctx = self
            .inner
            .ctx
            .lock()
            .map_err(|_| TpmError::Context("mutex poisoned".into()))?;
        f(&mut ctx, self.inner.primary)
    }
}

/// Deterministic restricted decryption primary (same template on every boot,
/// so sealed blobs stay loadable).
fn create_primary(ctx: &mut Context) -> Result<KeyHandle, TpmError> {
    let ecc_params = PublicEccParametersBuilder::new_restricted_decryption_key(
        SymmetricDefinitionObject::AES_128_CFB,
        EccCurve::NistP256,
    )
    .build()
    .map_err(|e| TpmError::Primary(e.to_string()))?;

    let attrs = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_sensitive_data_origin(true)
        .with_user_with_auth(true)
        .with_restricted(true)
        .with_decrypt(true)
        .build()
        .map_err(|e| TpmError::Primary(e.to_string()))?;

    let pub_template = PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Ecc)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attrs)
        .with_ecc_parameters(ecc_params)
        .with_ecc_unique_identifier(EccPoint::default())
        .build()
        .map_err(|e| TpmError::Primary(e.to_string()))?;

    let result = ctx
        .execute_with_nullauth_session(|ctx| {
            ctx.create_primary(Hierarchy::Owner, pub_template, None, None, None, None)
        })
        .map_err(|e: tss_esapi::Error| TpmError::Primary(e.to_string()))?;

    Ok(result.key_handle)
}
