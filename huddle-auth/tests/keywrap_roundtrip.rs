//! End-to-end exercise of the org-key wrapping protocol, performed entirely
//! with client-side material the way real devices would: the "server" in
//! this test is nothing but a place blobs sit between publish and fetch.

use huddle_auth::keywrap::{
    decode_public_key, generate_org_key, unwrap_org_key, wrap_org_key, DeviceKeyPair,
    KeyWrapEnvelope, WrapContext,
};
use uuid::Uuid;

#[test]
fn publish_fetch_unwrap_reproduces_the_org_key_for_every_member() {
    let org_id = Uuid::new_v4();

    // Three members, each with their own device keypair. The publisher only
    // ever sees the registered public halves, as base64 strings.
    let members: Vec<(Uuid, DeviceKeyPair)> = (0..3)
        .map(|_| (Uuid::new_v4(), DeviceKeyPair::generate()))
        .collect();
    let registered: Vec<(Uuid, String)> = members
        .iter()
        .map(|(id, kp)| (*id, kp.public_key_base64()))
        .collect();

    // Publisher generates the org key and wraps it per member.
    let org_key = generate_org_key();
    let mut stored_blobs = Vec::new();
    for (user_id, public_b64) in &registered {
        let recipient = decode_public_key(public_b64).unwrap();
        let ctx = WrapContext {
            org_id,
            user_id: *user_id,
            key_version: 1,
        };
        let blob = wrap_org_key(&org_key, &recipient, &ctx).unwrap().encode();
        stored_blobs.push((*user_id, blob));
    }

    // Each member fetches their blob and unwraps with their private key.
    for (user_id, device) in &members {
        let (_, blob) = stored_blobs
            .iter()
            .find(|(id, _)| id == user_id)
            .expect("every member has a wrap");

        let envelope = KeyWrapEnvelope::decode(blob).unwrap();
        let ctx = WrapContext {
            org_id,
            user_id: *user_id,
            key_version: 1,
        };
        let unwrapped = unwrap_org_key(&envelope, device, &ctx).unwrap();
        assert_eq!(unwrapped.as_ref(), org_key.as_ref());
    }

    // A member cannot unwrap another member's blob.
    let (alice_id, _) = &members[0];
    let (_, bob_device) = &members[1];
    let (_, alice_blob) = stored_blobs.iter().find(|(id, _)| id == alice_id).unwrap();
    let envelope = KeyWrapEnvelope::decode(alice_blob).unwrap();
    let ctx = WrapContext {
        org_id,
        user_id: *alice_id,
        key_version: 1,
    };
    assert!(unwrap_org_key(&envelope, bob_device, &ctx).is_err());
}

#[test]
fn tampered_stored_blob_fails_rather_than_returning_wrong_bytes() {
    let device = DeviceKeyPair::generate();
    let org_key = generate_org_key();
    let ctx = WrapContext {
        org_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        key_version: 1,
    };

    let blob = wrap_org_key(&org_key, device.public_key(), &ctx)
        .unwrap()
        .encode();

    // Flip one bit in the base64 ciphertext payload of the stored blob.
    let raw: serde_json::Value = serde_json::from_str(&blob).unwrap();
    let ct = raw["ct"].as_str().unwrap();
    let mut ct_bytes = base64_decode(ct);
    ct_bytes[0] ^= 0x01;
    let mut tampered = raw.clone();
    tampered["ct"] = serde_json::Value::String(base64_encode(&ct_bytes));

    let envelope = KeyWrapEnvelope::decode(&tampered.to_string()).unwrap();
    assert!(unwrap_org_key(&envelope, &device, &ctx).is_err());
}

#[test]
fn rotation_story_old_wraps_still_open_under_their_own_version() {
    let device = DeviceKeyPair::generate();
    let org_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    // Version 1 key, wrapped and stored.
    let old_key = generate_org_key();
    let old_ctx = WrapContext {
        org_id,
        user_id,
        key_version: 1,
    };
    let old_blob = wrap_org_key(&old_key, device.public_key(), &old_ctx)
        .unwrap()
        .encode();

    // Rotation: a fresh key wrapped under version 2 replaces the member's
    // current wrap, but the old blob (e.g. cached client-side) still opens
    // under its own version, so old data stays readable.
    let new_key = generate_org_key();
    let new_ctx = WrapContext {
        org_id,
        user_id,
        key_version: 2,
    };
    let new_blob = wrap_org_key(&new_key, device.public_key(), &new_ctx)
        .unwrap()
        .encode();

    let old_unwrapped = unwrap_org_key(
        &KeyWrapEnvelope::decode(&old_blob).unwrap(),
        &device,
        &old_ctx,
    )
    .unwrap();
    let new_unwrapped = unwrap_org_key(
        &KeyWrapEnvelope::decode(&new_blob).unwrap(),
        &device,
        &new_ctx,
    )
    .unwrap();

    assert_eq!(old_unwrapped.as_ref(), old_key.as_ref());
    assert_eq!(new_unwrapped.as_ref(), new_key.as_ref());
    assert_ne!(old_unwrapped.as_ref(), new_unwrapped.as_ref());

    // The version is part of the binding: an old blob does not open as if
    // it were the new generation.
    assert!(unwrap_org_key(
        &KeyWrapEnvelope::decode(&old_blob).unwrap(),
        &device,
        &new_ctx,
    )
    .is_err());
}

fn base64_decode(s: &str) -> Vec<u8> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.decode(s).unwrap()
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(bytes)
}
