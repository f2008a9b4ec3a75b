use std::convert::TryFrom;
use tss_esapi::Context;
use tss_esapi::attributes::ObjectAttributesBuilder;
use tss_esapi::handles::KeyHandle;
use tss_esapi::handles::ObjectHandle;
use tss_esapi::interface_types::algorithm::HashingAlgorithm;
use tss_esapi::interface_types::algorithm::PublicAlgorithm;
use tss_esapi::structures::KeyedHashScheme;
use tss_esapi::structures::Private;
use tss_esapi::structures::Public;
use tss_esapi::structures::PublicBuilder;
use tss_esapi::structures::PublicKeyedHashParameters;
use tss_esapi::structures::SensitiveData;
use tss_esapi::traits::Marshall;
use tss_esapi::traits::UnMarshall;
use zeroize::Zeroizing;

use super::TpmError;
use crate::backend::{KEY_SIZE, RawKey};

/// Sealed key as persisted on disk.
pub struct SealedBlob {
    pub private: Vec<u8>,
    pub public: Vec<u8>,
}

impl SealedBlob {
    /// `u32be(len(private)) ‖ private ‖ public`
    pub fn encode(&self) -> Vec<u8> {
        let private_len = self.private.len() as u32;
        let mut blob = Vec::with_capacity(4 + self.private.len() + self.public.len());
        blob.extend_from_slice(&private_len.to_be_bytes());
        blob.extend_from_slice(&self.private);
        blob.extend_from_slice(&self.public);
        blob
    }

    pub fn decode(blob: &[u8]) -> Result<Self, TpmError> {
        let Some((len_bytes, rest)) = blob.split_first_chunk::<4>() else {
            return Err(TpmError::Seal("sealed blob is truncated".into()));
        };
        let private_len = u32::from_be_bytes(*len_bytes) as usize;
        if rest.len() < private_len {
            return Err(TpmError::Seal("sealed blob private section truncated".into()));
        }
        let (private, public) = rest.split_at(private_len);
        Ok(Self {
            private: private.to_vec(),
            public: public.to_vec(),
        })
    }
}

/// Seal a freshly generated AES-256 key under `primary`.
pub fn create_seal(
    ctx: &mut Context,
    primary: KeyHandle,
) -> Result<(SealedBlob, RawKey), TpmError> {
    let key = RawKey::generate();

    let sensitive = SensitiveData::try_from(key.as_bytes().to_vec())
        .map_err(|e| TpmError::Seal(e.to_string()))?;

    let attrs = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_user_with_auth(true)
        .with_no_da(true)
        .build()
        .map_err(|e| TpmError::Seal(e.to_string()))?;

    let seal_params = PublicKeyedHashParameters::new(KeyedHashScheme::Null);

    let pub_template = PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::KeyedHash)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attrs)
        .with_keyed_hash_parameters(seal_params)
        .with_keyed_hash_unique_identifier(Default::default())
        .build()
        .map_err(|e| TpmError::Seal(e.to_string()))?;

    let result = ctx
        .execute_with_nullauth_session(|ctx| {
            ctx.create(primary, pub_template, None, Some(sensitive), None, None)
        })
        .map_err(|e: tss_esapi::Error| TpmError::Seal(e.to_string()))?;

    let private = result.out_private.value().to_vec();
    let public = result
        .out_public
        .marshall()
        .map_err(|e| TpmError::Seal(e.to_string()))?;

    Ok((SealedBlob { private, public }, key))
}

/// Load a sealed object and unseal the AES-256 key inside it.
pub fn unseal(
    ctx: &mut Context,
    primary: KeyHandle,
    blob: &SealedBlob,
) -> Result<RawKey, TpmError> {
    let private = Private::try_from(blob.private.clone())
        .map_err(|e| TpmError::Seal(e.to_string()))?;
    let public = Public::unmarshall(&blob.public)
        .map_err(|e| TpmError::Seal(e.to_string()))?;

    let sealed_handle = ctx
        .execute_with_nullauth_session(|ctx| ctx.load(primary, private, public))
        .map_err(|e: tss_esapi::Error| TpmError::Seal(e.to_string()))?;

    let sensitive = ctx
        .execute_with_nullauth_session(|ctx| ctx.unseal(ObjectHandle::from(sealed_handle)))
        .map_err(|e: tss_esapi::Error| {
            let _ = ctx.flush_context(ObjectHandle::from(sealed_handle));
            TpmError::Seal(e.to_string())
        })?;

    ctx.flush_context(ObjectHandle::from(sealed_handle))
        .map_err(|e| TpmError::Seal(e.to_string()))?;

    let bytes = Zeroizing::new(sensitive.value().to_vec());
    RawKey::from_bytes(&bytes).ok_or_else(|| {
        TpmError::Seal(format!("expected {KEY_SIZE}-byte key, got {}", bytes.len()))
    })
}
