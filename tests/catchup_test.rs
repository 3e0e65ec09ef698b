use std::time::Instant;

use ed25519_dalek::SigningKey;
use log::LevelFilter;
use rand_core::OsRng;
use rbft_node::{
    events::Event,
    execution::domain::get_attr,
    ledger::registry::LedgerRegistry,
    networking::messages::{
        CatchupMessage, CatchupRep, CatchupReq, ClientMessage, ConsistencyProof, LedgerStatus, Message,
    },
    replicas::replica::Replica,
    runner::RunningNode,
    types::{
        data_types::{
            ClientAddress, LedgerId, NodeMode, PpSeqNo, ReqId, SeqNo, ThreePhaseKey, ViewNumber,
        },
        request::{Operation, Request, Transaction, WriteOperation},
    },
};

mod common;

use crate::common::{
    logging::setup_logger,
    mem_db::MemDB,
    node::{drain_events, Pool},
};

// The catch-up messages that validator `index` received from the node.
fn catchup_messages(pool: &mut Pool, index: usize) -> Vec<CatchupMessage> {
    pool.networks[index]
        .drain()
        .into_iter()
        .filter_map(|(_, msg)| match msg {
            Message::Catchup(msg) => Some(msg),
            _ => None,
        })
        .collect()
}

#[test]
fn catchup_with_transactions_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Initialize a pool of 4 validators, and a domain ledger that is 2 transactions ahead of the
    // genesis.
    let mut pool = Pool::new(4);
    let ahead = MemDB::new();
    RunningNode::initialize(ahead.clone(), pool.genesis()).unwrap();
    let mut ahead_ledgers = LedgerRegistry::open(ahead).unwrap();
    let client = SigningKey::generate(&mut OsRng);
    let requests: Vec<Request> = (1..=2)
        .map(|i| {
            Request::signed(
                &client,
                ReqId::new(i),
                Operation::Write(WriteOperation {
                    key: format!("key{}", i).into_bytes(),
                    value: format!("value{}", i).into_bytes(),
                }),
            )
        })
        .collect();
    for request in &requests {
        let domain = &mut ahead_ledgers.get_mut(LedgerId::Domain).ledger;
        let mut txn = Transaction::from_request(request, 1_700_000_000);
        txn.seq_no = SeqNo::new(domain.size() + 1);
        domain.append(txn).unwrap();
    }
    let ahead_domain = &ahead_ledgers.get(LedgerId::Domain).ledger;
    assert_eq!(ahead_domain.size(), 3);

    // 2. Start the node and catch up its pool ledger.
    let (mut node, events) = pool.node_on(MemDB::new());
    let now = Instant::now();
    node.start(now);
    pool.confirm_ledger(&mut node, LedgerId::Pool, &[1, 2], None, now);
    pool.clear_inboxes();
    let our_root = node.ledgers().get(LedgerId::Domain).root_hash();
    let last_3pc = ThreePhaseKey::new(ViewNumber::new(0), PpSeqNo::new(5));

    // 3. Consistency proofs from f + 1 = 2 peers fix the target, and the missing transactions are
    // requested.
    for peer in [1, 2] {
        node.on_message(
            pool.verifying_key(peer),
            ConsistencyProof {
                ledger_id: LedgerId::Domain,
                seq_no_start: 1,
                seq_no_end: 3,
                last_3pc: Some(last_3pc),
                old_root_hash: our_root,
                new_root_hash: ahead_domain.root_hash(),
            }
            .into(),
            now,
        );
    }
    let requested: Vec<(usize, CatchupMessage)> = [1, 2]
        .into_iter()
        .flat_map(|peer| {
            catchup_messages(&mut pool, peer)
                .into_iter()
                .map(move |msg| (peer, msg))
        })
        .collect();
    let provider = match requested.as_slice() {
        [(provider, msg)] => {
            assert_eq!(
                *msg,
                CatchupMessage::CatchupReq(CatchupReq {
                    ledger_id: LedgerId::Domain,
                    seq_no_start: 2,
                    seq_no_end: 3,
                    catchup_till: 3,
                })
            );
            *provider
        }
        _ => panic!("expected a single catch-up request"),
    };
    let other = if provider == 1 { 2 } else { 1 };

    // 4. A reply from a peer the range was not requested from is ignored, and an incomplete reply from
    // the provider is buffered.
    node.on_message(
        pool.verifying_key(other),
        CatchupRep {
            ledger_id: LedgerId::Domain,
            txns: ahead_domain.get_range(SeqNo::new(2), SeqNo::new(3)).unwrap(),
        }
        .into(),
        now,
    );
    node.on_message(
        pool.verifying_key(provider),
        CatchupRep {
            ledger_id: LedgerId::Domain,
            txns: ahead_domain.get_range(SeqNo::new(2), SeqNo::new(2)).unwrap(),
        }
        .into(),
        now,
    );
    assert_eq!(node.mode(), NodeMode::Syncing);
    assert_eq!(node.ledgers().get(LedgerId::Domain).size(), 1);

    // 5. The rest of the transactions complete the catch-up of the domain ledger. Since the round
    // applied transactions, another round follows.
    node.on_message(
        pool.verifying_key(provider),
        CatchupRep {
            ledger_id: LedgerId::Domain,
            txns: ahead_domain.get_range(SeqNo::new(2), SeqNo::new(3)).unwrap(),
        }
        .into(),
        now,
    );
    assert_eq!(node.mode(), NodeMode::Syncing);
    let domain = node.ledgers().get(LedgerId::Domain);
    assert_eq!(domain.size(), 3);
    assert_eq!(domain.root_hash(), ahead_domain.root_hash());
    assert_eq!(get_attr(&domain.state, b"key2", true), Some(b"value2".to_vec()));
    let caught_up: Vec<(LedgerId, u64)> = drain_events(&events)
        .into_iter()
        .filter_map(|event| match event {
            Event::EndCatchup(event) => Some((event.ledger_id, event.txns_applied)),
            _ => None,
        })
        .collect();
    assert_eq!(caught_up, vec![(LedgerId::Pool, 0), (LedgerId::Domain, 2)]);

    // 6. A round that applies nothing lets the node participate, fast-forwarded to the last batch the
    // peers reported.
    pool.confirm_ledger(&mut node, LedgerId::Pool, &[1, 2], None, now);
    pool.confirm_ledger(&mut node, LedgerId::Domain, &[1, 2], None, now);
    assert_eq!(node.mode(), NodeMode::Participating);
    assert_eq!(node.last_executed(), Some(last_3pc));
    assert_eq!(node.replicas().master().unwrap().last_ordered_3pc(), last_3pc);

    // 7. A request that was caught up is answered from the ledger.
    let address = ClientAddress::new(9);
    node.on_client_request(address, requests[0].clone(), now);
    let sent = pool.networks[0].take_client_messages();
    assert!(matches!(
        sent.as_slice(),
        [(_, ClientMessage::Reply(reply))] if reply.txn.seq_no == SeqNo::new(2)
    ));
}

#[test]
fn serve_lagging_peer_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Bring a node to participation, and grow its domain ledger by one transaction.
    let mut pool = Pool::new(4);
    let kv_store = MemDB::new();
    RunningNode::initialize(kv_store.clone(), pool.genesis()).unwrap();
    {
        let mut ledgers = LedgerRegistry::open(kv_store.clone()).unwrap();
        let client = SigningKey::generate(&mut OsRng);
        let request = Request::signed(
            &client,
            ReqId::new(1),
            Operation::Write(WriteOperation {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            }),
        );
        let mut txn = Transaction::from_request(&request, 0);
        txn.seq_no = SeqNo::new(2);
        ledgers.get_mut(LedgerId::Domain).ledger.append(txn).unwrap();
    }
    let (mut node, _events) = pool.node_on(kv_store);
    let now = Instant::now();
    pool.bring_to_participating(&mut node, now);
    pool.clear_inboxes();
    let domain = &node.ledgers().get(LedgerId::Domain).ledger;
    let genesis_root = domain.root_hash_at(1).unwrap().unwrap();
    let root = domain.root_hash();

    // 2. A peer reports a smaller domain ledger, and is sent a consistency proof.
    node.on_message(
        pool.verifying_key(3),
        LedgerStatus {
            ledger_id: LedgerId::Domain,
            size: 1,
            last_3pc: None,
            root_hash: genesis_root,
        }
        .into(),
        now,
    );
    assert_eq!(
        catchup_messages(&mut pool, 3),
        vec![CatchupMessage::ConsistencyProof(ConsistencyProof {
            ledger_id: LedgerId::Domain,
            seq_no_start: 1,
            seq_no_end: 2,
            last_3pc: None,
            old_root_hash: genesis_root,
            new_root_hash: root,
        })]
    );

    // 3. The peer requests the missing transaction, and is sent it.
    node.on_message(
        pool.verifying_key(3),
        CatchupReq {
            ledger_id: LedgerId::Domain,
            seq_no_start: 2,
            seq_no_end: 2,
            catchup_till: 2,
        }
        .into(),
        now,
    );
    match catchup_messages(&mut pool, 3).as_slice() {
        [CatchupMessage::CatchupRep(rep)] => {
            assert_eq!(rep.txns.len(), 1);
            assert_eq!(rep.txns[0].seq_no, SeqNo::new(2));
        }
        _ => panic!("expected a single catch-up reply"),
    }
}
