//! Work-service coverage: difficulty inheritance before the first
//! retarget, template assembly over an empty and a non-empty mempool, and
//! a build -> mine -> submit round trip.

use chrono::{Duration, Utc};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use chain::{
    amount::Amount,
    block::{Block, Header, Height},
    parameters::{genesis, Network},
    transaction::{LockTime, Transaction},
    transparent::{CoinbaseData, Input, OutPoint, Output, Script},
    work::CompactDifficulty,
    BitcoinSerialize,
};
use miner::{build_template, compute_next_bits, submit_block, BlockTemplate};
use node::{Chain, IngestResult};

/// `0x207fffff`, Bitcoin-regtest-style: half the 256-bit space meets this
/// target, so mining a header against it converges in a handful of nonces.
fn easy_difficulty() -> CompactDifficulty {
    CompactDifficulty(0x207f_ffff)
}

fn mine_against(header: Header) -> Header {
    for nonce in 0..10_000u32 {
        let candidate = Header::new(
            header.version,
            header.previous_block_hash,
            header.merkle_root,
            header.time,
            header.difficulty_threshold,
            nonce,
        );
        if consensus::work::meets_difficulty_target(&candidate) {
            return candidate;
        }
    }
    panic!("failed to mine a header within the nonce budget");
}

fn header_for(parent: &Block, transactions: &[std::sync::Arc<Transaction>], time: chrono::DateTime<Utc>, bits: CompactDifficulty) -> Header {
    let merkle_root: chain::block::Hash = transactions
        .iter()
        .map(|tx| tx.hash())
        .collect::<chain::block::merkle::Root>()
        .into();
    Header::new(1, parent.hash(), merkle_root, time, bits, 0)
}

fn mined_block(parent: &Block, transactions: Vec<Transaction>, time: chrono::DateTime<Utc>) -> Block {
    let transactions: Vec<_> = transactions.into_iter().map(std::sync::Arc::new).collect();
    let header = mine_against(header_for(parent, &transactions, time, easy_difficulty()));
    Block { header, transactions }
}

fn keypair() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(&[0xab; 32]).expect("valid scalar");
    let pk = PublicKey::from_secret_key(&secp, &sk);
    (sk, pk)
}

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

fn push_data(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(data.len() as u8);
    buf.extend_from_slice(data);
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

fn open_chain() -> (tempdir::TempDir, Chain) {
    let dir = tempdir::TempDir::new("scryptd-miner-test").unwrap();
    let config = state::Config {
        cache_dir: dir.path().to_owned(),
        ephemeral: true,
    };
    let chain = Chain::open(&config, dir.path().join("mempool.dat"), Network::Mainnet).unwrap();
    (dir, chain)
}

#[test]
fn bits_before_the_first_retarget_are_the_genesis_bits() {
    let (_dir, chain) = open_chain();
    let genesis_bits = genesis::genesis_block(Network::Mainnet).header.difficulty_threshold;
    assert_eq!(compute_next_bits(&chain, Height(1)).unwrap(), genesis_bits);
    assert_eq!(compute_next_bits(&chain, Height(2015)).unwrap(), genesis_bits);
}

#[test]
fn bits_past_the_tip_within_the_first_interval_are_still_genesis_bits() {
    // A block's own `difficulty_threshold` is whatever it was mined against,
    // not necessarily what a template would have offered -- these tests mine
    // everything at `easy_difficulty` for speed. `compute_next_bits` must not
    // be fooled by that: every height short of the first retarget boundary
    // gets the network's genesis bits, regardless of what's actually on disk.
    let (_dir, mut chain) = open_chain();
    let genesis = genesis::genesis_block(Network::Mainnet);
    let (_sk, pk) = keypair();
    let genesis_bits = genesis.header.difficulty_threshold;

    let b1 = mined_block(
        &genesis,
        vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), script::p2pkh_lock_script(pubkey_hash(&pk)), 1)],
        genesis.header.time + Duration::seconds(150),
    );
    assert_ne!(b1.header.difficulty_threshold, genesis_bits);
    chain.ingest(b1, Utc::now()).unwrap();

    assert_eq!(compute_next_bits(&chain, Height(2)).unwrap(), genesis_bits);
}

fn pubkey_hash(pk: &PublicKey) -> [u8; 20] {
    chain::hashing::hash160(&pk.serialize())
}

#[test]
fn template_on_genesis_pays_the_full_subsidy_to_the_requested_address() {
    let (_dir, chain) = open_chain();
    let target = [9u8; 20];

    let template = build_template(&chain, target).unwrap();

    assert_eq!(template.version, 1);
    assert_eq!(template.height, Height(1));
    assert_eq!(
        template.previous_block_hash,
        genesis::genesis_hash(Network::Mainnet)
    );
    assert_eq!(template.transactions.len(), 1);

    let coinbase = &template.transactions[0];
    assert!(coinbase.is_coinbase());
    assert_eq!(coinbase.outputs.len(), 1);
    assert_eq!(coinbase.outputs[0].value, Amount::from_u64(50 * chain::amount::COIN));
    assert_eq!(coinbase.outputs[0].lock_script, script::p2pkh_lock_script(target));
}

#[test]
fn template_includes_a_mature_mempool_spend_and_its_fee() {
    let (_dir, mut chain) = open_chain();
    let genesis = genesis::genesis_block(Network::Mainnet);
    let (sk, pk) = keypair();
    let lock_script = script::p2pkh_lock_script(pubkey_hash(&pk));

    let b1 = mined_block(
        &genesis,
        vec![coinbase_tx(Amount::from_u64(50 * chain::amount::COIN), lock_script.clone(), 1)],
        genesis.header.time + Duration::seconds(150),
    );
    let coinbase_outpoint = OutPoint {
        hash: b1.transactions[0].hash(),
        index: 0,
    };
    chain.ingest(b1.clone(), Utc::now()).unwrap();

    // Mature the coinbase: 99 more blocks brings the tip to height 100, so
    // a spend admitted against a height-101 template is allowed.
    let mut parent = b1;
    for i in 0..99u8 {
        let (_, filler_pk) = keypair();
        let b = mined_block(
            &parent,
            vec![coinbase_tx(
                Amount::from_u64(50 * chain::amount::COIN),
                script::p2pkh_lock_script(pubkey_hash(&filler_pk)),
                i,
            )],
            parent.header.time + Duration::seconds(150),
        );
        chain.ingest(b.clone(), Utc::now()).unwrap();
        parent = b;
    }
    assert_eq!(chain.tip_height().unwrap(), Height(100));

    let fee = Amount::from_u64(1_000);
    let spend_amount = Amount::from_u64(50 * chain::amount::COIN)
        .checked_sub(fee)
        .unwrap();
    let mut spend = Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: coinbase_outpoint,
            unlock_script: Script(Vec::new()),
            sequence: 0xffff_ffff,
        }],
        vec![Output {
            value: spend_amount,
            lock_script: script::p2pkh_lock_script(pubkey_hash(&pk)),
        }],
        LockTime::unlocked(),
    );
    spend.inputs[0] = Input::PrevOut {
        outpoint: coinbase_outpoint,
        unlock_script: sign(&spend, 0, &lock_script, &sk),
        sequence: 0xffff_ffff,
    };
    let spend_hash = chain.admit_to_mempool(spend).unwrap();

    let template = build_template(&chain, [1u8; 20]).unwrap();
    assert_eq!(template.height, Height(101));
    assert_eq!(template.transactions.len(), 2);
    assert_eq!(template.transactions[1].hash(), spend_hash);

    let coinbase_value = template.transactions[0].outputs[0].value;
    let subsidy = consensus::block::subsidy::general::block_subsidy(Height(101));
    assert_eq!(coinbase_value, subsidy.checked_add(fee).unwrap());
}

#[test]
fn a_mined_template_round_trips_through_submit_block() {
    let (_dir, mut chain) = open_chain();
    let template: BlockTemplate = build_template(&chain, [3u8; 20]).unwrap();

    let header = mine_against(template.header(0));
    let block = Block {
        header,
        transactions: template.transactions.clone(),
    };
    let hex = hex::encode(block.bitcoin_serialize_to_vec().unwrap());

    let result = submit_block(&mut chain, &hex).unwrap();
    assert!(matches!(result, IngestResult::ExtendedMain { height: Height(1) }));
    assert_eq!(chain.tip_height().unwrap(), Height(1));
}
