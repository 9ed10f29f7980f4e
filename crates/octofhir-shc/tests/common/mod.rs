//! Shared fixtures: a signing issuer backed by a mock key-set endpoint.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::DeflateEncoder;
use octofhir_shc::jws::encode_segment;
use octofhir_shc::{
    CodeLabels, JwksCache, KeySetCacheConfig, Scanner, ScannerConfig, TrustedIssuer,
    TrustedIssuers, encode_numeric,
};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const JWKS_PATH: &str = "/.well-known/jwks.json";
pub const ISSUER_NAME: &str = "Example Health Department";
pub const NBF: i64 = 1_620_847_989;

/// An issuer with its own P-256 key, served by a mock HTTP server.
pub struct TestIssuer {
    pub server: MockServer,
    key: SigningKey,
    kid: String,
}

impl TestIssuer {
    /// Starts a server without any mounted key set.
    pub async fn start_bare() -> Self {
        Self {
            server: MockServer::start().await,
            key: SigningKey::random(&mut OsRng),
            kid: "test-key-1".to_string(),
        }
    }

    /// Starts a server publishing this issuer's key set.
    pub async fn start() -> Self {
        let issuer = Self::start_bare().await;
        issuer.mount_jwks(None).await;
        issuer
    }

    pub async fn mount_jwks(&self, delay: Option<Duration>) {
        let mut response = ResponseTemplate::new(200)
            .set_body_json(self.jwks())
            .insert_header("Cache-Control", "max-age=3600");
        if let Some(delay) = delay {
            response = response.set_delay(delay);
        }
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    pub fn iss(&self) -> String {
        self.server.uri()
    }

    pub fn jwks(&self) -> Value {
        let point = self.key.verifying_key().to_encoded_point(false);
        json!({
            "keys": [{
                "kty": "EC",
                "kid": self.kid,
                "use": "sig",
                "alg": "ES256",
                "crv": "P-256",
                "x": encode_segment(point.x().unwrap()),
                "y": encode_segment(point.y().unwrap()),
            }]
        })
    }

    /// Signs a payload as a compact JWS with a deflated payload.
    pub fn sign(&self, payload: &Value) -> String {
        let header = json!({"zip": "DEF", "alg": "ES256", "kid": self.kid});
        let input = format!(
            "{}.{}",
            encode_segment(header.to_string().as_bytes()),
            encode_segment(&deflate(payload.to_string().as_bytes()))
        );
        let signature: Signature = self.key.sign(input.as_bytes());
        format!("{input}.{}", encode_segment(&signature.to_bytes()))
    }

    /// Signs a payload and encodes it as an `shc:/` QR string.
    pub fn card(&self, payload: &Value) -> String {
        encode_numeric(&self.sign(payload)).unwrap()
    }

    pub fn trusted(&self) -> TrustedIssuers {
        TrustedIssuers::new(vec![TrustedIssuer {
            iss: self.iss(),
            name: ISSUER_NAME.to_string(),
        }])
    }
}

pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// HTTP key-set cache allowing the mock server's plain HTTP.
pub fn http_cache() -> JwksCache {
    JwksCache::new(KeySetCacheConfig::new().with_allow_http(true)).unwrap()
}

pub fn scanner(issuers: TrustedIssuers, config: ScannerConfig) -> Scanner {
    Scanner::new(
        Arc::new(issuers),
        Arc::new(CodeLabels::builtin()),
        Arc::new(http_cache()),
        config,
    )
}

pub fn patient(family: &str, given: &[&str], birth_date: &str) -> Value {
    json!({
        "resourceType": "Patient",
        "name": [{"family": family, "given": given}],
        "birthDate": birth_date
    })
}

pub fn immunization(date: &str, cvx: &str, lot: &str) -> Value {
    json!({
        "resourceType": "Immunization",
        "meta": {"security": [{"system": "https://smarthealth.cards/ial", "code": "IAL2"}]},
        "status": "completed",
        "vaccineCode": {"coding": [{"system": "http://hl7.org/fhir/sid/cvx", "code": cvx}]},
        "patient": {"reference": "resource:0"},
        "occurrenceDateTime": date,
        "manufacturer": {"identifier": {"system": "http://hl7.org/fhir/sid/mvx", "value": "MOD"}},
        "performer": [{"actor": {"display": "ABC General Hospital"}}],
        "lotNumber": lot
    })
}

/// A health card payload carrying the given bundle resources.
pub fn credential(iss: &str, resources: Vec<Value>) -> Value {
    let entry: Vec<Value> = resources
        .into_iter()
        .enumerate()
        .map(|(i, resource)| json!({"fullUrl": format!("resource:{i}"), "resource": resource}))
        .collect();
    json!({
        "iss": iss,
        "nbf": NBF,
        "vc": {
            "type": [
                "https://smarthealth.cards#health-card",
                "https://smarthealth.cards#immunization",
                "https://smarthealth.cards#covid19"
            ],
            "credentialSubject": {
                "fhirVersion": "4.0.1",
                "fhirBundle": {
                    "resourceType": "Bundle",
                    "type": "collection",
                    "entry": entry
                }
            }
        }
    })
}

pub fn standard_credential(iss: &str) -> Value {
    credential(
        iss,
        vec![
            patient("Anyperson", &["John", "B."], "1951-01-20"),
            immunization("2021-01-29", "207", "0000007"),
            immunization("2021-01-01", "207", "0000001"),
        ],
    )
}
