//! End-to-end scenarios across the block engine: framing, storage, XOR
//! whitening, CBL description, and quorum sealing working together.

use brightchain_core::block::{decrypt_block, encrypt_block, new_cbl};
use brightchain_core::{
    calculate_checksum, quorum_seal, quorum_unseal, Block, BlockHandleTuple, BlockParams,
    BlockSize, BlockStore, BlockVariant, DiskBlockStore, Member, SealingError, StoreConfig,
    StoreError, TUPLE_SIZE,
};
use brightchain_core::{BlockDataType, BlockError};
use chrono::{Duration, Utc};

async fn open_small_store(root: &std::path::Path) -> DiskBlockStore {
    DiskBlockStore::open(StoreConfig {
        root: root.to_path_buf(),
        block_size: BlockSize::Small,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn round_trip_small_encrypted_block() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_small_store(dir.path()).await;
    let recipient = Member::generate();

    // An all-empty plaintext still produces a full 97-byte envelope header
    let mut params = BlockParams::raw(BlockSize::Small, b"");
    params.variant = BlockVariant::Ephemeral;
    let plain = Block::new(params).unwrap();
    let encrypted = encrypt_block(&recipient, &plain).unwrap();
    assert_eq!(encrypted.layer_header_data().len(), 97);

    store.set_data(&encrypted).await.unwrap();
    let handle = store.get(&encrypted.id_checksum()).await;
    handle.validate().await.unwrap();
    assert_eq!(handle.id_checksum(), calculate_checksum(encrypted.data()));

    // And the envelope still opens after the disk round trip
    let raw = store.get_data(&encrypted.id_checksum()).await.unwrap();
    assert_eq!(raw.data(), encrypted.data());
}

#[tokio::test]
async fn corruption_is_detected_at_construction() {
    let recipient = Member::generate();
    let mut params = BlockParams::raw(BlockSize::Small, b"soon to corrupt");
    params.variant = BlockVariant::Ephemeral;
    let encrypted = encrypt_block(&recipient, &Block::new(params).unwrap()).unwrap();

    let expected = encrypted.id_checksum();
    let mut corrupted = encrypted.data().to_vec();
    corrupted[0] ^= 0x01;

    let mut params = BlockParams::raw(BlockSize::Small, &corrupted);
    params.checksum = Some(expected);
    match Block::new(params) {
        Err(BlockError::ChecksumMismatch {
            expected: reported,
            computed,
        }) => {
            assert_eq!(reported, expected);
            assert_eq!(computed, calculate_checksum(&corrupted));
            assert_ne!(computed, reported);
        }
        other => panic!("expected ChecksumMismatch, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn future_dated_block_is_rejected() {
    let mut params = BlockParams::raw(BlockSize::Small, b"from tomorrow");
    params.date_created = Some(Utc::now() + Duration::milliseconds(86_400_000));
    assert!(matches!(
        Block::new(params),
        Err(BlockError::FutureCreationDate { .. })
    ));
}

#[tokio::test]
async fn xor_round_trip_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_small_store(dir.path()).await;

    let a = Block::random(BlockSize::Small).unwrap();
    let b = Block::random(BlockSize::Small).unwrap();
    let c = Block::random(BlockSize::Small).unwrap();
    let handle_a = store.set_data(&a).await.unwrap();
    let handle_b = store.set_data(&b).await.unwrap();
    let handle_c = store.set_data(&c).await.unwrap();

    // R = XOR(A, B, C), persisted through the tuple path
    let tuple = BlockHandleTuple::new(vec![handle_a, handle_b.clone(), handle_c.clone()]).unwrap();
    assert!(tuple.verify().await);
    let derived = tuple.xor_to_store(&store, None).await.unwrap();

    // XOR(R, B, C) must reproduce A bytewise, checksum included
    let back = BlockHandleTuple::new(vec![derived, handle_b, handle_c]).unwrap();
    let recovered = store.xor(back.handles(), None).await.unwrap();
    assert_eq!(recovered.data(), a.data());
    assert_eq!(recovered.id_checksum(), a.id_checksum());
}

#[tokio::test]
async fn quorum_two_of_three() {
    let agent = Member::generate();
    let members: Vec<Member> = (0..3).map(|_| Member::generate()).collect();

    let record = quorum_seal(&agent, &"hello", &members, Some(2)).unwrap();

    let opened: String = quorum_unseal(&record, &members[..2]).unwrap();
    assert_eq!(opened, "hello");

    assert!(matches!(
        quorum_unseal::<String>(&record, &members[..1]),
        Err(SealingError::NotEnoughMembersToUnlock { .. })
    ));
}

#[tokio::test]
async fn oversize_data_is_rejected() {
    let oversize = vec![0u8; BlockSize::Small.as_usize() + 1];
    assert!(matches!(
        Block::new(BlockParams::raw(BlockSize::Small, &oversize)),
        Err(BlockError::DataLengthExceedsCapacity {
            capacity: 4096,
            actual: 4097
        })
    ));
}

#[tokio::test]
async fn identical_payloads_diverge_in_padding_only() {
    let payload = b"deterministic prefix";
    let a = Block::new(BlockParams::raw(BlockSize::Small, payload)).unwrap();
    let b = Block::new(BlockParams::raw(BlockSize::Small, payload)).unwrap();

    assert_eq!(&a.data()[..payload.len()], &b.data()[..payload.len()]);
    assert_ne!(a.data(), b.data());
    assert_ne!(a.id_checksum(), b.id_checksum());
}

#[tokio::test]
async fn store_is_immutable_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_small_store(dir.path()).await;
    let block = Block::new(BlockParams::raw(BlockSize::Small, b"write once")).unwrap();

    store.set_data(&block).await.unwrap();
    assert!(matches!(
        store.set_data(&block).await,
        Err(StoreError::BlockPathAlreadyExists(_))
    ));

    // The winning write is intact
    let loaded = store.get_data(&block.id_checksum()).await.unwrap();
    assert_eq!(loaded.data(), block.data());
}

#[tokio::test]
async fn whitened_file_described_by_cbl() {
    // A miniature end-to-end OFF flow: encrypt a payload for its owner,
    // whiten it against two random blocks, and describe the tuple in a CBL
    // whose addresses drive reassembly.
    let dir = tempfile::tempdir().unwrap();
    let store = open_small_store(dir.path()).await;
    let owner = Member::generate();

    let payload = b"the original file bytes";
    let mut params = BlockParams::raw(BlockSize::Small, payload);
    params.variant = BlockVariant::Ephemeral;
    params.creator = Some(owner.id());
    let source = Block::new(params).unwrap();
    let encrypted = encrypt_block(&owner, &source).unwrap();

    // Whiten: store the XOR of the encrypted block with two random blocks
    let white_one = Block::random(BlockSize::Small).unwrap();
    let white_two = Block::random(BlockSize::Small).unwrap();
    let encrypted_handle = store.set_data(&encrypted).await.unwrap();
    let white_one_handle = store.set_data(&white_one).await.unwrap();
    let white_two_handle = store.set_data(&white_two).await.unwrap();
    let tuple =
        BlockHandleTuple::new(vec![encrypted_handle, white_one_handle, white_two_handle]).unwrap();
    let derived_handle = tuple.xor_to_store(&store, None).await.unwrap();

    // The CBL records the derived block and its whiteners
    let addresses = vec![
        derived_handle.id_checksum(),
        white_one.id_checksum(),
        white_two.id_checksum(),
    ];
    let cbl = new_cbl(
        &owner,
        BlockSize::Small,
        &addresses,
        payload.len() as u64,
        TUPLE_SIZE as u8,
    )
    .unwrap();
    assert_eq!(
        cbl.metadata().data_type(),
        BlockDataType::EphemeralStructuredData
    );
    store.set_data(&cbl).await.unwrap();

    // Reassembly: fetch the CBL, verify its creator, XOR its members back
    let stored_cbl = store.get_data(&cbl.id_checksum()).await.unwrap();
    let reparsed =
        brightchain_core::block::cbl_block_from_bytes(BlockSize::Small, stored_cbl.data(), false)
            .unwrap();
    assert!(reparsed.verify_creator_signature(&owner).unwrap());

    let listed = reparsed.addresses().unwrap();
    assert_eq!(listed, addresses);
    let mut member_handles = Vec::new();
    for address in &listed {
        member_handles.push(store.get(address).await);
    }
    let rebuilt_tuple = BlockHandleTuple::new(member_handles).unwrap();
    let recovered_encrypted = store.xor(rebuilt_tuple.handles(), None).await.unwrap();
    assert_eq!(recovered_encrypted.data(), encrypted.data());

    // Finally, reframe the raw bytes as an encrypted block using the
    // original length recorded in the CBL, and open the envelope
    let reframed = {
        let mut params = BlockParams::raw(BlockSize::Small, recovered_encrypted.data());
        params.variant = BlockVariant::Encrypted;
        params.data_type = BlockDataType::EncryptedData;
        params.actual_data_length = Some(reparsed.cbl_header().unwrap().original_data_length);
        Block::new(params).unwrap()
    };
    let decrypted = decrypt_block(&owner, &reframed).unwrap();
    assert_eq!(&decrypted.data()[..payload.len()], payload);
}
