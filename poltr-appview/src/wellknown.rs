//! `/.well-known/did.json` and the attestation-record lexicon.
//!
//! Grounded on `freeq-server::verifiers::did_document` (multicodec/multibase
//! verification-method encoding) and
//! `original_source/services/appview/src/wellknown.py` for the document
//! shape and lexicon NSID.

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn did_document(State(state): State<AppState>) -> Json<Value> {
    let did = format!("did:web:{}", state.config.feed_generator_did.trim_start_matches("did:web:"));
    let key_id = format!("{did}#attestation");
    Json(json!({
        "@context": [
            "https://www.w3.org/ns/did/v1",
            "https://w3id.org/security/multikey/v1",
        ],
        "id": did,
        "verificationMethod": [{
            "id": key_id,
            "type": "Multikey",
            "controller": did,
            "publicKeyMultibase": state.attestation.public_key_multibase(),
        }],
        "assertionMethod": [key_id],
    }))
}

pub async fn verification_lexicon() -> Json<Value> {
    Json(json!({
        "lexicon": 1,
        "id": "ch.poltr.verification.attestation",
        "defs": {
            "main": {
                "type": "record",
                "description": "An eID-style attestation over a hashed claim, signed by the platform's Ed25519 verification key.",
                "record": {
                    "type": "object",
                    "required": ["hash", "issuerDid", "ts", "signature"],
                    "properties": {
                        "hash": { "type": "string" },
                        "issuerDid": { "type": "string", "format": "did" },
                        "ts": { "type": "string", "format": "datetime" },
                        "signature": { "type": "string" },
                    },
                },
            },
        },
    }))
}
