//! Software authenticator for end-to-end ceremony tests.
//!
//! Mirrors what a platform authenticator produces: client data JSON,
//! authenticator data with flags and counter, and an ECDSA P-256 signature
//! over `authenticator_data ‖ SHA-256(client_data)`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ciborium::value::{Integer, Value as CborValue};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};

use passkey_verifier::{AuthenticationResponse, RegistrationResponse};

const FLAG_UP: u8 = 1 << 0;
const FLAG_UV: u8 = 1 << 2;
const FLAG_AT: u8 = 1 << 6;

pub struct SoftAuthenticator {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
    pub credential_id: String,
}

impl SoftAuthenticator {
    pub fn new() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("keygen failed");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .expect("keypair parse failed");

        let mut id_bytes = [0u8; 16];
        rng.fill(&mut id_bytes).expect("rng failed");

        Self {
            key_pair,
            rng,
            credential_id: URL_SAFE_NO_PAD.encode(id_bytes),
        }
    }

    pub fn registration_response(&self, challenge: &str, origin: &str) -> RegistrationResponse {
        let client_data = client_data_json("webauthn.create", challenge, origin);
        let auth_data = authenticator_data(origin, FLAG_UP | FLAG_UV | FLAG_AT, 0);

        RegistrationResponse {
            credential_id: self.credential_id.clone(),
            signature: self.sign(&auth_data, &client_data),
            client_data_json: URL_SAFE_NO_PAD.encode(&client_data),
            authenticator_data: URL_SAFE_NO_PAD.encode(&auth_data),
            public_key: self.cose_public_key(),
            authenticator_label: None,
        }
    }

    pub fn authentication_response(
        &self,
        challenge: &str,
        origin: &str,
        counter: u32,
        user_verified: bool,
    ) -> AuthenticationResponse {
        let client_data = client_data_json("webauthn.get", challenge, origin);
        let mut flags = FLAG_UP;
        if user_verified {
            flags |= FLAG_UV;
        }
        let auth_data = authenticator_data(origin, flags, counter);

        AuthenticationResponse {
            credential_id: self.credential_id.clone(),
            signature: self.sign(&auth_data, &client_data),
            client_data_json: URL_SAFE_NO_PAD.encode(&client_data),
            authenticator_data: URL_SAFE_NO_PAD.encode(&auth_data),
        }
    }

    pub fn tamper(signature: &str) -> String {
        let mut bytes = URL_SAFE_NO_PAD.decode(signature).expect("decode failed");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn cose_public_key(&self) -> String {
        let point = self.key_pair.public_key().as_ref();
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
        URL_SAFE_NO_PAD.encode(out)
    }

    fn sign(&self, auth_data: &[u8], client_data: &[u8]) -> String {
        let client_data_hash = digest::digest(&digest::SHA256, client_data);
        let mut signed_data = auth_data.to_vec();
        signed_data.extend_from_slice(client_data_hash.as_ref());
        let signature = self
            .key_pair
            .sign(&self.rng, &signed_data)
            .expect("signing failed");
        URL_SAFE_NO_PAD.encode(signature.as_ref())
    }
}

fn client_data_json(type_: &str, challenge: &str, origin: &str) -> Vec<u8> {
    let json = serde_json::json!({
        "type": type_,
        "challenge": challenge,
        "origin": origin,
    });
    serde_json::to_vec(&json).expect("json encode failed")
}

fn authenticator_data(origin: &str, flags: u8, counter: u32) -> Vec<u8> {
    let rp_id = origin
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split(':')
        .next()
        .unwrap_or(origin);
    let rp_id_hash = digest::digest(&digest::SHA256, rp_id.as_bytes());

    let mut data = Vec::with_capacity(37);
    data.extend_from_slice(rp_id_hash.as_ref());
    data.push(flags);
    data.extend_from_slice(&counter.to_be_bytes());
    data
}
