//! Test helpers for the verification core.
//!
//! Provides a deterministic software authenticator backed by a ring ECDSA
//! P-256 key pair. It produces the same signed envelopes a platform
//! authenticator would, so the verifiers can be exercised without a device.

use chrono::Utc;
use ciborium::value::{Integer, Value as CborValue};
use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};

use crate::config::rp_id_from_origin;
use crate::types::{
    AuthenticationResponse, CredentialKey, CredentialRecord, RegistrationResponse,
    auth_data_flags,
};
use crate::utils::{base64url_decode, base64url_encode, gen_random_string};

pub(crate) struct SoftAuthenticator {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
    pub(crate) credential_id: String,
}

impl SoftAuthenticator {
    pub(crate) fn new() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("keygen failed");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .expect("keypair parse failed");
        let credential_id = gen_random_string(16).expect("rng failed");
        Self {
            key_pair,
            rng,
            credential_id,
        }
    }

    /// The public key as a base64url COSE_Key (EC2, ES256).
    pub(crate) fn cose_public_key(&self) -> String {
        let point = self.key_pair.public_key().as_ref();
        assert_eq!(point.len(), 65, "expected uncompressed P-256 point");
        let map = CborValue::Map(vec![
            (
                CborValue::Integer(Integer::from(1)),
                CborValue::Integer(Integer::from(2)),
            ),
            (
                CborValue::Integer(Integer::from(3)),
                CborValue::Integer(Integer::from(-7)),
            ),
            (
                CborValue::Integer(Integer::from(-2)),
                CborValue::Bytes(point[1..33].to_vec()),
            ),
            (
                CborValue::Integer(Integer::from(-3)),
                CborValue::Bytes(point[33..65].to_vec()),
            ),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&map, &mut out).expect("cbor encode failed");
        base64url_encode(out)
    }

    /// A credential record as it would exist after successful registration.
    pub(crate) fn credential_record(&self, signature_counter: u32) -> CredentialRecord {
        let now = Utc::now();
        CredentialRecord {
            credential_id: self.credential_id.clone(),
            public_key: CredentialKey::from_cose_base64(&self.cose_public_key())
                .expect("cose key parse failed"),
            signature_counter,
            authenticator_label: Some("Soft Authenticator".to_string()),
            created_at: now,
            updated_at: now,
            last_used_at: now,
        }
    }

    pub(crate) fn registration_response(
        &self,
        challenge: &str,
        origin: &str,
    ) -> RegistrationResponse {
        let client_data = encode_client_data("webauthn.create", challenge, origin);
        let flags = auth_data_flags::UP | auth_data_flags::UV | auth_data_flags::AT;
        let auth_data = encode_authenticator_data(&rp_id_from_origin(origin), flags, 0);

        RegistrationResponse {
            credential_id: self.credential_id.clone(),
            signature: self.sign(&auth_data, &client_data),
            client_data_json: base64url_encode(&client_data),
            authenticator_data: base64url_encode(&auth_data),
            public_key: self.cose_public_key(),
            authenticator_label: None,
        }
    }

    pub(crate) fn authentication_response(
        &self,
        challenge: &str,
        origin: &str,
        counter: u32,
        user_verified: bool,
    ) -> AuthenticationResponse {
        let client_data = encode_client_data("webauthn.get", challenge, origin);
        let mut flags = auth_data_flags::UP;
        if user_verified {
            flags |= auth_data_flags::UV;
        }
        let auth_data = encode_authenticator_data(&rp_id_from_origin(origin), flags, counter);

        AuthenticationResponse {
            credential_id: self.credential_id.clone(),
            signature: self.sign(&auth_data, &client_data),
            client_data_json: base64url_encode(&client_data),
            authenticator_data: base64url_encode(&auth_data),
        }
    }

    /// Signs `authenticator_data ‖ SHA-256(client_data)`, base64url-encoded.
    fn sign(&self, auth_data: &[u8], client_data: &[u8]) -> String {
        let client_data_hash = digest::digest(&digest::SHA256, client_data);
        let mut signed_data = auth_data.to_vec();
        signed_data.extend_from_slice(client_data_hash.as_ref());
        let signature = self
            .key_pair
            .sign(&self.rng, &signed_data)
            .expect("signing failed");
        base64url_encode(signature.as_ref())
    }

    /// Corrupts a base64url signature by flipping one bit.
    pub(crate) fn tamper(signature: &str) -> String {
        let mut bytes = base64url_decode(signature).expect("signature decode failed");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        base64url_encode(bytes)
    }
}

fn encode_client_data(type_: &str, challenge: &str, origin: &str) -> Vec<u8> {
    let json = serde_json::json!({
        "type": type_,
        "challenge": challenge,
        "origin": origin,
    });
    serde_json::to_vec(&json).expect("json encode failed")
}

fn encode_authenticator_data(rp_id: &str, flags: u8, counter: u32) -> Vec<u8> {
    let rp_id_hash = digest::digest(&digest::SHA256, rp_id.as_bytes());
    let mut data = Vec::with_capacity(37);
    data.extend_from_slice(rp_id_hash.as_ref());
    data.push(flags);
    data.extend_from_slice(&counter.to_be_bytes());
    data
}
