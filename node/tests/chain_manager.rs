//! End-to-end coverage of the chain manager's Ingest state machine against
//! the six concrete scenarios: genesis bootstrap, extend-main, coinbase
//! maturity, orphan resolution, reorg, and a mempool double-spend.

use chrono::{Duration, Utc};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use chain::{
    amount::Amount,
    block::{Block, Header, Height},
    parameters::{genesis, Network},
    transaction::{LockTime, Transaction},
    transparent::{CoinbaseData, Input, OutPoint, Output, Script},
    work::CompactDifficulty,
};
use node::{Chain, IngestResult};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_PUSHDATA1: u8 = 0x4c;

/// `0x207fffff`, Bitcoin-regtest-style: half the 256-bit space meets this
/// target, so mining a header against it converges in a handful of nonces
/// rather than needing real proof-of-work effort.
fn easy_difficulty() -> CompactDifficulty {
    CompactDifficulty(0x207f_ffff)
}

fn push_data(buf: &mut Vec<u8>, data: &[u8]) {
    if data.len() <= 0x4b {
        buf.push(data.len() as u8);
    } else {
        buf.push(OP_PUSHDATA1);
        buf.push(data.len() as u8);
    }
    buf.extend_from_slice(data);
}

fn p2pkh_lock_script(pubkey: &PublicKey) -> Script {
    let hash = chain::hashing::hash160(&pubkey.serialize());
    let mut bytes = Vec::with_capacity(25);
    bytes.push(OP_DUP);
    bytes.push(OP_HASH160);
    bytes.push(20);
    bytes.extend_from_slice(&hash);
    bytes.push(OP_EQUALVERIFY);
    bytes.push(OP_CHECKSIG);
    Script(bytes)
}

fn keypair() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(&[0xab; 32]).expect("valid scalar");
    let pk = PublicKey::from_secret_key(&secp, &sk);
    (sk, pk)
}

/// Sign input `index` of `tx` (which spends `previous_lock_script`) and
/// return the resulting scriptSig: a DER signature (with the SIGHASH_ALL
/// type byte appended) followed by the public key, the only shape
/// `script::verify_p2pkh` accepts.
fn sign(tx: &Transaction, index: usize, previous_lock_script: &Script, sk: &SecretKey) -> Script {
    let secp = Secp256k1::signing_only();
    let sighash = script::sighash_preimage(tx, index, previous_lock_script);
    let message = Message::from_slice(&sighash).expect("sighash is 32 bytes");
    let signature = secp.sign(&message, sk);
    let pubkey = PublicKey::from_secret_key(&secp, sk);

    let mut der = signature.serialize_der().to_vec();
    der.push(0x01); // SIGHASH_ALL

    let mut bytes = Vec::new();
    push_data(&mut bytes, &der);
    push_data(&mut bytes, &pubkey.serialize());
    Script(bytes)
}

/// Build (but don't mine) a header sitting on top of `parent`, covering
/// `block`'s transactions with a fresh Merkle root.
fn header_for(parent: &Block, transactions: &[std::sync::Arc<Transaction>], time: chrono::DateTime<Utc>) -> Header {
    let merkle_root: chain::block::Hash = transactions
        .iter()
        .map(|tx| tx.hash())
        .collect::<chain::block::merkle::Root>()
        .into();
    Header::new(1, parent.hash(), merkle_root, time, easy_difficulty(), 0)
}

/// Brute-force `header.nonce` until it meets its own declared target.
fn mine(mut header: Header) -> Header {
    for nonce in 0..10_000u32 {
        header = Header::new(
            header.version,
            header.previous_block_hash,
            header.merkle_root,
            header.time,
            header.difficulty_threshold,
            nonce,
        );
        if consensus::work::meets_difficulty_target(&header) {
            return header;
        }
    }
    panic!("failed to mine a header meeting an easy target within the nonce budget");
}

fn coinbase_tx(reward: Amount, lock_script: Script, extra_nonce: u8) -> Transaction {
    Transaction::new(
        1,
        vec![Input::Coinbase {
            height: None,
            data: CoinbaseData::new(vec![extra_nonce]),
            sequence: 0xffff_ffff,
        }],
        vec![Output {
            value: reward,
            lock_script,
        }],
        LockTime::unlocked(),
    )
}

fn mined_block(
    parent: &Block,
    transactions: Vec<Transaction>,
    time: chrono::DateTime<Utc>,
) -> Block {
    let transactions: Vec<_> = transactions.into_iter().map(std::sync::Arc::new).collect();
    let header = mine(header_for(parent, &transactions, time));
    Block { header, transactions }
}

fn open_chain() -> (tempdir::TempDir, Chain) {
    let dir = tempdir::TempDir::new("scryptd-node-test").unwrap();
    let config = state::Config {
        cache_dir: dir.path().to_owned(),
        ephemeral: true,
    };
    let chain = Chain::open(&config, dir.path().join("mempool.dat"), Network::Mainnet).unwrap();
    (dir, chain)
}

#[test]
fn genesis_bootstrap() {
    let (_dir, chain) = open_chain();
    assert_eq!(chain.tip_height().unwrap(), Height(0));
    assert_eq!(chain.tip_hash().unwrap(), genesis::genesis_hash(Network::Mainnet));
}

#[test]
fn extend_main_accepts_a_block_on_top_of_genesis() {
    let (_dir, mut chain) = open_chain();
    let genesis = genesis::genesis_block(Network::Mainnet);
    let (_sk, pk) = keypair();
    let lock_script = p2pkh_lock_script(&pk);

    let b1 = mined_block(
        &genesis,
        vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), lock_script, 1)],
        genesis.header.time + Duration::seconds(150),
    );
    let coinbase_hash = b1.transactions[0].hash();

    let result = chain.ingest(b1, Utc::now()).unwrap();
    assert!(matches!(result, IngestResult::ExtendedMain { height: Height(1) }));
    assert_eq!(chain.tip_height().unwrap(), Height(1));

    let utxo = chain
        .utxos()
        .get(&OutPoint {
            hash: coinbase_hash,
            index: 0,
        })
        .unwrap()
        .expect("coinbase output is in the UTXO set");
    assert_eq!(utxo.output.value, Amount::from_u64(50 * chain::amount::COIN));
    assert!(utxo.is_coinbase);
    assert_eq!(utxo.height, 1);
}

#[test]
fn coinbase_spend_is_rejected_until_it_matures() {
    let (_dir, mut chain) = open_chain();
    let genesis = genesis::genesis_block(Network::Mainnet);
    let (sk, pk) = keypair();
    let lock_script = p2pkh_lock_script(&pk);

    let b1 = mined_block(
        &genesis,
        vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), lock_script.clone(), 1)],
        genesis.header.time + Duration::seconds(150),
    );
    let coinbase_outpoint = OutPoint {
        hash: b1.transactions[0].hash(),
        index: 0,
    };
    chain.ingest(b1, Utc::now()).unwrap();

    let mut spend = Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: coinbase_outpoint,
            unlock_script: Script(Vec::new()),
            sequence: 0xffff_ffff,
        }],
        vec![Output {
            value: Amount::from_u64(40 * chain::amount::COIN),
            lock_script: p2pkh_lock_script(&pk),
        }],
        LockTime::unlocked(),
    );
    spend.inputs[0] = Input::PrevOut {
        outpoint: coinbase_outpoint,
        unlock_script: sign(&spend, 0, &lock_script, &sk),
        sequence: 0xffff_ffff,
    };

    assert!(matches!(
        chain.admit_to_mempool(spend.clone()),
        Err(node::ChainError::Mempool(mempool::MempoolError::CoinbaseImmature))
    ));

    // Mine 99 more blocks (to height 100); maturity requires 100
    // confirmations, so the tip height reaching 100 makes a mempool spend
    // at height 101 valid.
    let mut parent = chain.block(chain.tip_hash().unwrap()).unwrap().unwrap();
    for i in 0..99u8 {
        let (_, filler_pk) = keypair();
        let b = mined_block(
            &parent,
            vec![coinbase_tx(
                Amount::from_u64(50 * chain::amount::COIN),
                p2pkh_lock_script(&filler_pk),
                i,
            )],
            parent.header.time + Duration::seconds(150),
        );
        chain.ingest(b.clone(), Utc::now()).unwrap();
        parent = b;
    }
    assert_eq!(chain.tip_height().unwrap(), Height(100));

    chain.admit_to_mempool(spend).unwrap();
}

#[test]
fn orphan_is_resolved_once_its_parent_arrives() {
    let (_dir, mut chain) = open_chain();
    let genesis = genesis::genesis_block(Network::Mainnet);
    let (_sk, pk) = keypair();

    let b1 = mined_block(
        &genesis,
        vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), p2pkh_lock_script(&pk), 1)],
        genesis.header.time + Duration::seconds(150),
    );
    let b2 = mined_block(
        &b1,
        vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), p2pkh_lock_script(&pk), 2)],
        b1.header.time + Duration::seconds(150),
    );
    let b2_hash = b2.hash();

    assert!(matches!(chain.ingest(b2, Utc::now()).unwrap(), IngestResult::Orphan));
    assert_eq!(chain.tip_height().unwrap(), Height(0));

    let result = chain.ingest(b1, Utc::now()).unwrap();
    assert!(matches!(result, IngestResult::ExtendedMain { height: Height(1) }));
    assert_eq!(chain.tip_height().unwrap(), Height(2));
    assert_eq!(chain.tip_hash().unwrap(), b2_hash);
}

#[test]
fn a_longer_sidechain_triggers_a_reorg() {
    let (_dir, mut chain) = open_chain();
    let genesis = genesis::genesis_block(Network::Mainnet);
    let (_sk, pk) = keypair();

    let mut chain_a_blocks = Vec::new();
    let mut parent = genesis.clone();
    for i in 0..3u8 {
        let b = mined_block(
            &parent,
            vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), p2pkh_lock_script(&pk), i)],
            parent.header.time + Duration::seconds(150),
        );
        chain.ingest(b.clone(), Utc::now()).unwrap();
        chain_a_blocks.push(b.clone());
        parent = b;
    }
    let fork_parent = chain_a_blocks[2].clone(); // height 3, the fork point

    // Extend chain A two further blocks, to height 5.
    for i in 10..12u8 {
        let b = mined_block(
            &parent,
            vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), p2pkh_lock_script(&pk), i)],
            parent.header.time + Duration::seconds(150),
        );
        chain.ingest(b.clone(), Utc::now()).unwrap();
        chain_a_blocks.push(b.clone());
        parent = b;
    }
    assert_eq!(chain.tip_height().unwrap(), Height(5));

    // Chain B branches at height 3 (after fork_parent) and runs to height 6,
    // one block longer than chain A: submitting its tip should trigger a
    // reorg once the whole branch is known.
    let mut chain_b_parent = fork_parent;
    let mut chain_b_blocks = Vec::new();
    for i in 20..23u8 {
        let b = mined_block(
            &chain_b_parent,
            vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), p2pkh_lock_script(&pk), i)],
            chain_b_parent.header.time + Duration::seconds(150),
        );
        chain_b_blocks.push(b.clone());
        chain_b_parent = b;
    }

    // Feed B's blocks in order; the final one (height 6) extends past A's
    // tip and should fire the reorg.
    let mut last_result = None;
    for b in chain_b_blocks {
        last_result = Some(chain.ingest(b, Utc::now()).unwrap());
    }
    assert!(matches!(last_result, Some(IngestResult::Reorganized { height: Height(6) })));
    assert_eq!(chain.tip_height().unwrap(), Height(6));

    // The old chain-A blocks above the fork point are demoted to sidechain.
    for b in &chain_a_blocks[3..] {
        assert_eq!(
            chain.block(b.hash()).unwrap().is_some(),
            true,
            "disconnected blocks remain stored"
        );
    }
}

#[test]
fn a_second_spend_of_the_same_output_is_rejected_and_the_snapshot_reflects_one_entry() {
    let (_dir, mut chain) = open_chain();
    let genesis = genesis::genesis_block(Network::Mainnet);
    let (sk, pk) = keypair();
    let lock_script = p2pkh_lock_script(&pk);

    let b1 = mined_block(
        &genesis,
        vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), lock_script.clone(), 1)],
        genesis.header.time + Duration::seconds(150),
    );
    let coinbase_outpoint = OutPoint {
        hash: b1.transactions[0].hash(),
        index: 0,
    };
    chain.ingest(b1, Utc::now()).unwrap();

    // Fast-forward 99 blocks so the coinbase output is mature.
    let mut parent = chain.block(chain.tip_hash().unwrap()).unwrap().unwrap();
    for i in 0..99u8 {
        let (_, filler_pk) = keypair();
        let b = mined_block(
            &parent,
            vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), p2pkh_lock_script(&filler_pk), i)],
            parent.header.time + Duration::seconds(150),
        );
        chain.ingest(b.clone(), Utc::now()).unwrap();
        parent = b;
    }

    let build_spend = |value: u64| {
        let mut spend = Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: coinbase_outpoint,
                unlock_script: Script(Vec::new()),
                sequence: 0xffff_ffff,
            }],
            vec![Output {
                value: Amount::from_u64(value),
                lock_script: p2pkh_lock_script(&pk),
            }],
            LockTime::unlocked(),
        );
        let unlock_script = sign(&spend, 0, &lock_script, &sk);
        spend.inputs[0] = Input::PrevOut {
            outpoint: coinbase_outpoint,
            unlock_script,
            sequence: 0xffff_ffff,
        };
        spend
    };

    let tx1 = build_spend(10 * chain::amount::COIN);
    let tx2 = build_spend(20 * chain::amount::COIN);

    chain.admit_to_mempool(tx1).unwrap();
    assert!(matches!(
        chain.admit_to_mempool(tx2),
        Err(node::ChainError::Mempool(mempool::MempoolError::Conflict))
    ));
    assert_eq!(chain.mempool().len(), 1);
}
