use std::time::Instant;

use ed25519_dalek::SigningKey;
use log::LevelFilter;
use rand_core::OsRng;
use rbft_node::{
    events::Event,
    execution::domain::get_attr,
    ledger::ledger::Ledger,
    networking::messages::{
        CatchupMessage, CatchupRep, ClientMessage, ConsistencyProof, Message, Propagate,
    },
    replicas::replica::{Ordered, ReplicaOutput},
    types::{
        data_types::{
            ClientAddress, CryptoHash, Identifier, InstanceId, LedgerId, NodeMode, PpSeqNo, ReqId,
            RequestKey, SeqNo, ThreePhaseKey, ViewNumber,
        },
        request::{NymOperation, Operation, Request, Role, Transaction, WriteOperation},
    },
};

mod common;

use crate::common::{
    logging::setup_logger,
    mem_db::MemDB,
    node::{drain_events, Pool, TestNode},
};

fn write_request(client: &SigningKey, req_id: u64, key: &[u8], value: &[u8]) -> Request {
    Request::signed(
        client,
        ReqId::new(req_id),
        Operation::Write(WriteOperation {
            key: key.to_vec(),
            value: value.to_vec(),
        }),
    )
}

fn ordered(inst_id: InstanceId, pp_seq_no: u64, req_keys: Vec<RequestKey>) -> Ordered {
    Ordered {
        inst_id,
        view_no: ViewNumber::new(0),
        pp_seq_no: PpSeqNo::new(pp_seq_no),
        pp_time: 1_700_000_000,
        req_keys,
        ledger_id: LedgerId::Domain,
        state_root: None,
        txn_root: None,
    }
}

// Submit `request` to the node as `client`, and have validator 1 propagate it so that it is finalised.
fn submit_and_finalise(
    pool: &Pool,
    node: &mut TestNode,
    client: ClientAddress,
    request: &Request,
    now: Instant,
) {
    node.on_client_request(client, request.clone(), now);
    node.on_message(
        pool.verifying_key(1),
        Propagate {
            request: request.clone(),
        }
        .into(),
        now,
    );
}

fn order_on_master(node: &mut TestNode, ordered: Ordered, now: Instant) {
    node.replicas_mut()
        .master_mut()
        .unwrap()
        .push_output(ReplicaOutput::Ordered(ordered));
    node.tick(now);
}

fn replies(pool: &Pool) -> Vec<(ClientAddress, ClientMessage)> {
    pool.networks[0]
        .take_client_messages()
        .into_iter()
        .filter(|(_, msg)| matches!(msg, ClientMessage::Reply(_)))
        .collect()
}

#[test]
fn execute_exactly_once_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Bring a node of a 4 validator pool to participation.
    let pool = Pool::new(4);
    let kv_store = MemDB::new();
    let (mut node, events) = pool.node_on(kv_store.clone());
    let now = Instant::now();
    pool.bring_to_participating(&mut node, now);
    let domain_size = node.ledgers().get(LedgerId::Domain).size();

    // 2. Submit a request. It is acknowledged, and finalised once one peer propagated it too.
    let client = SigningKey::generate(&mut OsRng);
    let address = ClientAddress::new(7);
    let request = write_request(&client, 1, b"colour", b"blue");
    submit_and_finalise(&pool, &mut node, address, &request, now);
    let acks = pool.networks[0].take_client_messages();
    assert!(matches!(acks.as_slice(), [(_, ClientMessage::RequestAck(_))]));
    assert_eq!(
        node.replicas().master().unwrap().finalised,
        vec![request.key()]
    );
    assert_eq!(
        node.replicas().get(InstanceId::new(1)).unwrap().finalised,
        vec![request.key()]
    );

    // 3. A batch ordered by a backup is not executed.
    node.replicas_mut()
        .get_mut(InstanceId::new(1))
        .unwrap()
        .push_output(ReplicaOutput::Ordered(ordered(InstanceId::new(1), 1, vec![request.key()])));
    node.tick(now);
    assert!(replies(&pool).is_empty());
    assert_eq!(node.ledgers().get(LedgerId::Domain).size(), domain_size);

    // 4. The same batch ordered by the master is executed and replied to.
    let batch = ordered(InstanceId::MASTER, 1, vec![request.key()]);
    order_on_master(&mut node, batch.clone(), now);
    let replies_sent = replies(&pool);
    assert_eq!(replies_sent.len(), 1);
    match &replies_sent[0] {
        (to, ClientMessage::Reply(reply)) => {
            assert_eq!(*to, address);
            assert_eq!(reply.txn.seq_no, SeqNo::new(domain_size + 1));
            assert_eq!(reply.root_hash, node.ledgers().get(LedgerId::Domain).root_hash());
        }
        _ => unreachable!(),
    }
    let key = ThreePhaseKey::new(ViewNumber::new(0), PpSeqNo::new(1));
    assert_eq!(node.last_executed(), Some(key));
    assert_eq!(
        get_attr(&node.ledgers().get(LedgerId::Domain).state, b"colour", true),
        Some(b"blue".to_vec())
    );

    // 5. The batch is recorded in the provenance index.
    let entry = node
        .provenance()
        .lookup(LedgerId::Domain, SeqNo::new(domain_size + 1))
        .unwrap();
    assert_eq!(entry.key, key);
    assert_eq!(entry.seq_range, domain_size + 1..domain_size + 2);

    // 6. Ordering the same batch again does nothing.
    order_on_master(&mut node, batch, now);
    assert!(replies(&pool).is_empty());
    assert_eq!(node.ledgers().get(LedgerId::Domain).size(), domain_size + 1);
    let executions = drain_events(&events)
        .into_iter()
        .filter(|event| matches!(event, Event::ExecuteBatch(_)))
        .count();
    assert_eq!(executions, 1);

    // 7. Resubmitting the committed request is answered from the ledger, without ordering it again.
    node.on_client_request(address, request.clone(), now);
    let answers = pool.networks[0].take_client_messages();
    assert!(matches!(
        answers.as_slice(),
        [(_, ClientMessage::Reply(reply))] if reply.txn.req_id == request.req_id
    ));

    // 8. After a restart, the executed batch is still known.
    drop(node);
    let (restarted, _) = pool.node_on(kv_store);
    assert_eq!(restarted.last_executed(), Some(key));
    assert_eq!(restarted.ledgers().get(LedgerId::Domain).size(), domain_size + 1);
}

#[test]
fn ordered_while_syncing_is_stashed_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Start a node and catch up only its pool ledger.
    let pool = Pool::new(4);
    let (mut node, _events) = pool.node_on(MemDB::new());
    let now = Instant::now();
    node.start(now);
    pool.confirm_ledger(&mut node, LedgerId::Pool, &[1, 2], None, now);
    assert_eq!(node.mode(), NodeMode::Syncing);

    // 2. A batch ordered while the domain ledger is syncing is not executed yet.
    let client = SigningKey::generate(&mut OsRng);
    let address = ClientAddress::new(1);
    let request = write_request(&client, 1, b"k", b"v");
    submit_and_finalise(&pool, &mut node, address, &request, now);
    pool.networks[0].take_client_messages();
    order_on_master(&mut node, ordered(InstanceId::MASTER, 1, vec![request.key()]), now);
    assert!(replies(&pool).is_empty());
    assert_eq!(node.last_executed(), None);

    // 3. Once the domain ledger is caught up, the stashed batch is executed.
    pool.confirm_ledger(&mut node, LedgerId::Domain, &[1, 2], None, now);
    assert_eq!(node.mode(), NodeMode::Participating);
    assert_eq!(replies(&pool).len(), 1);
    assert_eq!(
        node.last_executed(),
        Some(ThreePhaseKey::new(ViewNumber::new(0), PpSeqNo::new(1)))
    );
}

#[test]
fn mismatched_roots_start_catchup_test() {
    setup_logger(LevelFilter::Trace);

    let bogus_roots: [fn(Ordered) -> Ordered; 2] = [
        |ordered| Ordered {
            txn_root: Some(CryptoHash::new([7; 32])),
            ..ordered
        },
        |ordered| Ordered {
            state_root: Some(CryptoHash::new([7; 32])),
            ..ordered
        },
    ];
    for with_bogus_root in bogus_roots {
        // 1. Bring a node of a 4 validator pool to participation, and finalise a request.
        let pool = Pool::new(4);
        let (mut node, events) = pool.node_on(MemDB::new());
        let now = Instant::now();
        pool.bring_to_participating(&mut node, now);
        let domain = node.ledgers().get(LedgerId::Domain);
        let (domain_size, domain_root) = (domain.size(), domain.root_hash());
        let client = SigningKey::generate(&mut OsRng);
        let request = write_request(&client, 1, b"k", b"v");
        submit_and_finalise(&pool, &mut node, ClientAddress::new(1), &request, now);
        pool.networks[0].take_client_messages();
        drain_events(&events);

        // 2. A batch that does not produce the agreed root is reverted instead of executed.
        let batch = with_bogus_root(ordered(InstanceId::MASTER, 1, vec![request.key()]));
        order_on_master(&mut node, batch, now);
        let domain = node.ledgers().get(LedgerId::Domain);
        assert_eq!(domain.size(), domain_size);
        assert_eq!(domain.uncommitted_root_hash(), domain_root);
        assert_eq!(get_attr(&domain.state, b"k", false), None);
        assert_eq!(node.last_executed(), None);
        assert!(replies(&pool).is_empty());

        // 3. The node catches up instead.
        assert_eq!(node.mode(), NodeMode::Syncing);
        let events = drain_events(&events);
        assert!(events
            .iter()
            .any(|event| matches!(event, Event::StartCatchup(_))));
        assert!(events
            .iter()
            .all(|event| !matches!(event, Event::ExecuteBatch(_))));
    }
}

#[test]
fn matching_roots_are_executed_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Bring a node of a 4 validator pool to participation, and finalise a request.
    let pool = Pool::new(4);
    let (mut node, _events) = pool.node_on(MemDB::new());
    let now = Instant::now();
    pool.bring_to_participating(&mut node, now);
    let client = SigningKey::generate(&mut OsRng);
    let request = write_request(&client, 1, b"k", b"v");
    submit_and_finalise(&pool, &mut node, ClientAddress::new(1), &request, now);
    pool.networks[0].take_client_messages();

    // 2. A batch carrying the ledger root it produces is executed.
    let batch = ordered(InstanceId::MASTER, 1, vec![request.key()]);
    let domain = node.ledgers().get(LedgerId::Domain);
    let mut txn = Transaction::from_request(&request, batch.pp_time);
    txn.seq_no = SeqNo::new(domain.size() + 1);
    let txn_root = Ledger::<MemDB>::candidate_root(domain.root_hash(), &[txn]);
    order_on_master(
        &mut node,
        Ordered {
            txn_root: Some(txn_root),
            ..batch
        },
        now,
    );
    assert_eq!(node.ledgers().get(LedgerId::Domain).root_hash(), txn_root);
    assert_eq!(node.mode(), NodeMode::Participating);
    assert_eq!(replies(&pool).len(), 1);
}

#[test]
fn stash_replay_stops_at_mismatched_batch_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Start a node and catch up only its pool ledger.
    let mut pool = Pool::new(4);
    let (mut node, events) = pool.node_on(MemDB::new());
    let now = Instant::now();
    node.start(now);
    pool.confirm_ledger(&mut node, LedgerId::Pool, &[1, 2], None, now);
    let genesis_size = node.ledgers().get(LedgerId::Domain).size();
    let genesis_root = node.ledgers().get(LedgerId::Domain).root_hash();

    // 2. Two batches are ordered while the domain ledger is syncing. The first carries a root this
    // node cannot produce.
    let client = SigningKey::generate(&mut OsRng);
    let address = ClientAddress::new(1);
    let first = write_request(&client, 1, b"k1", b"v1");
    let second = write_request(&client, 2, b"k2", b"v2");
    submit_and_finalise(&pool, &mut node, address, &first, now);
    submit_and_finalise(&pool, &mut node, address, &second, now);
    pool.networks[0].take_client_messages();
    order_on_master(
        &mut node,
        Ordered {
            txn_root: Some(CryptoHash::new([7; 32])),
            ..ordered(InstanceId::MASTER, 1, vec![first.key()])
        },
        now,
    );
    order_on_master(&mut node, ordered(InstanceId::MASTER, 2, vec![second.key()]), now);
    drain_events(&events);

    // 3. Completing the domain ledger replays the stash. The first batch starts another round, and
    // the second is not executed ahead of it.
    pool.confirm_ledger(&mut node, LedgerId::Domain, &[1, 2], None, now);
    assert_eq!(node.mode(), NodeMode::Syncing);
    assert_eq!(node.ledgers().get(LedgerId::Domain).size(), genesis_size);
    assert_eq!(node.last_executed(), None);
    assert!(replies(&pool).is_empty());
    let events_after_replay = drain_events(&events);
    assert!(events_after_replay
        .iter()
        .all(|event| !matches!(event, Event::ExecuteBatch(_))));
    assert!(events_after_replay.iter().any(
        |event| matches!(event, Event::StartCatchup(event) if event.ledger_id == LedgerId::Pool)
    ));

    // 4. The new round catches up the first batch's transaction from the pool.
    pool.confirm_ledger(&mut node, LedgerId::Pool, &[1, 2], None, now);
    pool.clear_inboxes();
    let first_key = ThreePhaseKey::new(ViewNumber::new(0), PpSeqNo::new(1));
    let mut first_txn = Transaction::from_request(&first, 1_700_000_000);
    first_txn.seq_no = SeqNo::new(genesis_size + 1);
    for peer in [1, 2] {
        node.on_message(
            pool.verifying_key(peer),
            ConsistencyProof {
                ledger_id: LedgerId::Domain,
                seq_no_start: genesis_size,
                seq_no_end: genesis_size + 1,
                last_3pc: Some(first_key),
                old_root_hash: genesis_root,
                new_root_hash: Ledger::<MemDB>::candidate_root(
                    genesis_root,
                    &[first_txn.clone()],
                ),
            }
            .into(),
            now,
        );
    }
    let provider = [1, 2]
        .into_iter()
        .find(|peer| {
            pool.networks[*peer].drain().iter().any(|(_, msg)| {
                matches!(msg, Message::Catchup(CatchupMessage::CatchupReq(_)))
            })
        })
        .unwrap();
    node.on_message(
        pool.verifying_key(provider),
        CatchupRep {
            ledger_id: LedgerId::Domain,
            txns: vec![first_txn],
        }
        .into(),
        now,
    );

    // 5. The rest of the stash is then executed in order, and the node participates after a round
    // that applies nothing.
    pool.confirm_ledger(&mut node, LedgerId::Pool, &[1, 2], None, now);
    pool.confirm_ledger(&mut node, LedgerId::Domain, &[1, 2], None, now);
    assert_eq!(node.mode(), NodeMode::Participating);
    let domain = &node.ledgers().get(LedgerId::Domain).ledger;
    let txns = domain
        .get_range(SeqNo::new(genesis_size + 1), SeqNo::new(genesis_size + 2))
        .unwrap();
    let req_ids: Vec<ReqId> = txns.iter().map(|txn| txn.req_id).collect();
    assert_eq!(req_ids, vec![first.req_id, second.req_id]);
    assert_eq!(
        node.last_executed(),
        Some(ThreePhaseKey::new(ViewNumber::new(0), PpSeqNo::new(2)))
    );
    assert!(replies(&pool).iter().any(|(_, msg)| matches!(
        msg,
        ClientMessage::Reply(reply) if reply.txn.req_id == second.req_id
    )));
}

#[test]
fn crash_before_batch_is_persisted_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Bring a node of a 4 validator pool to participation, and finalise a request.
    let pool = Pool::new(4);
    let kv_store = MemDB::new();
    let (mut node, _events) = pool.node_on(kv_store.clone());
    let now = Instant::now();
    pool.bring_to_participating(&mut node, now);
    let domain_size = node.ledgers().get(LedgerId::Domain).size();
    let client = SigningKey::generate(&mut OsRng);
    let address = ClientAddress::new(1);
    let request = write_request(&client, 1, b"k", b"v");
    submit_and_finalise(&pool, &mut node, address, &request, now);
    pool.networks[0].take_client_messages();

    // 2. The node crashes before anything of the batch reaches the store.
    kv_store.crash_after(0);
    let batch = ordered(InstanceId::MASTER, 1, vec![request.key()]);
    order_on_master(&mut node, batch.clone(), now);
    drop(node);
    kv_store.recover();

    // 3. After a restart, none of the batch is there: not its transaction, its state, its index
    // entry, or its key.
    let (mut restarted, events) = pool.node_on(kv_store);
    let domain = restarted.ledgers().get(LedgerId::Domain);
    assert_eq!(domain.size(), domain_size);
    assert_eq!(get_attr(&domain.state, b"k", true), None);
    assert_eq!(restarted.last_executed(), None);

    // 4. The request is not answered from the ledger, and the batch is executed exactly once.
    pool.bring_to_participating(&mut restarted, now);
    pool.networks[0].take_client_messages();
    submit_and_finalise(&pool, &mut restarted, address, &request, now);
    assert!(replies(&pool).is_empty());
    order_on_master(&mut restarted, batch, now);
    assert_eq!(replies(&pool).len(), 1);
    assert_eq!(restarted.ledgers().get(LedgerId::Domain).size(), domain_size + 1);
    assert_eq!(
        restarted.last_executed(),
        Some(ThreePhaseKey::new(ViewNumber::new(0), PpSeqNo::new(1)))
    );
    let executions = drain_events(&events)
        .into_iter()
        .filter(|event| matches!(event, Event::ExecuteBatch(_)))
        .count();
    assert_eq!(executions, 1);
}

#[test]
fn batch_is_persisted_in_one_write_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Bring a node of a 4 validator pool to participation, and finalise a request.
    let pool = Pool::new(4);
    let kv_store = MemDB::new();
    let (mut node, _events) = pool.node_on(kv_store.clone());
    let now = Instant::now();
    pool.bring_to_participating(&mut node, now);
    let domain_size = node.ledgers().get(LedgerId::Domain).size();
    let client = SigningKey::generate(&mut OsRng);
    let address = ClientAddress::new(1);
    let request = write_request(&client, 1, b"k", b"v");
    submit_and_finalise(&pool, &mut node, address, &request, now);
    pool.networks[0].take_client_messages();

    // 2. The node crashes right after its first write once the batch is ordered.
    kv_store.crash_after(1);
    let batch = ordered(InstanceId::MASTER, 1, vec![request.key()]);
    let key = batch.key();
    order_on_master(&mut node, batch.clone(), now);
    drop(node);
    kv_store.recover();

    // 3. That write held the whole batch.
    let (mut restarted, events) = pool.node_on(kv_store);
    let domain = restarted.ledgers().get(LedgerId::Domain);
    assert_eq!(domain.size(), domain_size + 1);
    assert_eq!(get_attr(&domain.state, b"k", true), Some(b"v".to_vec()));
    assert_eq!(restarted.last_executed(), Some(key));

    // 4. The request is answered from the ledger, and ordering the batch again does nothing.
    pool.bring_to_participating(&mut restarted, now);
    pool.networks[0].take_client_messages();
    restarted.on_client_request(address, request.clone(), now);
    assert!(matches!(
        pool.networks[0].take_client_messages().as_slice(),
        [(_, ClientMessage::Reply(reply))] if reply.txn.seq_no == SeqNo::new(domain_size + 1)
    ));
    order_on_master(&mut restarted, batch, now);
    assert_eq!(restarted.ledgers().get(LedgerId::Domain).size(), domain_size + 1);
    assert!(drain_events(&events)
        .iter()
        .all(|event| !matches!(event, Event::ExecuteBatch(_))));
}

#[test]
fn invalid_request_is_rejected_test() {
    setup_logger(LevelFilter::Trace);

    // 1. Bring a node of a 4 validator pool to participation.
    let pool = Pool::new(4);
    let (mut node, _events) = pool.node_on(MemDB::new());
    let now = Instant::now();
    pool.bring_to_participating(&mut node, now);

    // 2. A valid Write and a Nym that assigns a role without a trustee's signature are ordered in
    // one batch.
    let client = SigningKey::generate(&mut OsRng);
    let address = ClientAddress::new(3);
    let write = write_request(&client, 1, b"k", b"v");
    let nym = Request::signed(
        &client,
        ReqId::new(2),
        Operation::Nym(NymOperation {
            dest: Identifier::new(
                SigningKey::generate(&mut OsRng).verifying_key().to_bytes(),
            ),
            verkey: client.verifying_key().to_bytes(),
            role: Some(Role::Steward),
        }),
    );
    submit_and_finalise(&pool, &mut node, address, &write, now);
    submit_and_finalise(&pool, &mut node, address, &nym, now);
    pool.networks[0].take_client_messages();
    order_on_master(
        &mut node,
        ordered(InstanceId::MASTER, 1, vec![write.key(), nym.key()]),
        now,
    );

    // 3. The Write is replied to and the Nym is rejected.
    let sent = pool.networks[0].take_client_messages();
    assert_eq!(sent.len(), 2);
    assert!(sent
        .iter()
        .any(|(_, msg)| matches!(msg, ClientMessage::Reply(reply) if reply.txn.req_id == write.req_id)));
    assert!(sent
        .iter()
        .any(|(_, msg)| matches!(msg, ClientMessage::Reject(reject) if reject.req_id == nym.req_id)));
}
