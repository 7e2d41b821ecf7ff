//! Tick lifecycle and crash recovery.

use std::sync::Arc;

use ecb_ecs::{Component, EntityId};
use ecb_storage::{
    CommandBuffer, ErrorKind, GameState, LmdbConfig, LmdbStorage, MemoryStorage, PrimitiveStorage,
    ReaderExt, Writer, WriterExt,
};
use ecb_tick::{
    MessageType, MessageTypeId, SignedTransaction, TickConfig, TickError, TickResult, TickRunner,
    TickStorage, TxHash, TxPool, TxQueue,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    n: i64,
}

impl Component for Counter {
    const NAME: &'static str = "counter";
}

#[derive(Debug, Serialize, Deserialize)]
struct Increment {
    by: i64,
}

const INCREMENT: MessageTypeId = MessageTypeId::from_raw(1);
const COUNTER: EntityId = EntityId::from_raw(0);

fn messages() -> Vec<MessageType> {
    vec![MessageType::of::<Increment>(INCREMENT, "increment")]
}

fn open_state<S: PrimitiveStorage>(storage: Arc<S>) -> GameState<S> {
    let mut state = GameState::from_shared(storage);
    state.register_component::<Counter>().unwrap();
    state.init().unwrap();
    state
}

fn open_runner<S: PrimitiveStorage>(storage: Arc<S>) -> TickRunner<S> {
    TickRunner::open(open_state(storage), messages(), TickConfig::default()).unwrap()
}

fn submit(pool: &TxPool, by: i64, hash: &str) -> TxHash {
    let tx = SignedTransaction {
        persona_tag: "tester".into(),
        namespace: "counter-world".into(),
        timestamp: 1_700_000_000_000,
        body: serde_json::json!({ "by": by }),
        ..SignedTransaction::default()
    }
    .with_hash(hash);
    pool.add_transaction(INCREMENT, serde_json::json!({ "by": by }), tx)
}

fn create_counter<S: PrimitiveStorage>(ecb: &mut CommandBuffer<S>, _: &TxQueue) -> TickResult<()> {
    ecb.create_entity(&[&Counter::default()])?;
    Ok(())
}

fn apply<S: PrimitiveStorage>(ecb: &mut CommandBuffer<S>, queue: &TxQueue) -> TickResult<()> {
    for tx in queue.for_message(INCREMENT) {
        let increment: Increment = tx.msg_as()?;
        let mut counter = ecb.get_component::<Counter>(COUNTER)?;
        counter.n += increment.by;
        ecb.set_component(COUNTER, counter)?;
    }
    Ok(())
}

fn committed<S: PrimitiveStorage>(runner: &TickRunner<S>) -> i64 {
    let state = runner.state();
    let id = state.registry().id_of::<Counter>().unwrap();
    let raw = state
        .finalized()
        .unwrap()
        .get_component_for_entity_raw_json(id, COUNTER)
        .unwrap();
    serde_json::from_slice::<Counter>(&raw).unwrap().n
}

// ============================================================================
// Runner Tests
// ============================================================================

#[test]
fn test_ticks_commit_in_order() {
    let mut runner = open_runner(Arc::new(MemoryStorage::new()));
    assert_eq!(runner.tick(create_counter).unwrap(), 0);

    let pool = runner.pool();
    submit(&pool, 2, "0x01");
    submit(&pool, 3, "0x02");
    assert_eq!(runner.tick(apply).unwrap(), 1);
    assert!(pool.is_empty());
    assert_eq!(committed(&runner), 5);

    assert_eq!(runner.tick(apply).unwrap(), 2);
    assert_eq!(runner.tick_numbers().unwrap(), (3, 3));
    assert_eq!(
        runner
            .state()
            .finalized()
            .unwrap()
            .get_last_finalized_tick()
            .unwrap(),
        2
    );
}

#[test]
fn test_system_failure_retries_same_transactions() {
    let mut runner = open_runner(Arc::new(MemoryStorage::new()));
    runner.tick(create_counter).unwrap();

    let pool = runner.pool();
    submit(&pool, 7, "0x07");
    let err = runner
        .tick(|ecb, queue| {
            apply(ecb, queue)?;
            Err(TickError::system("out of mana"))
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(runner.tick_numbers().unwrap(), (2, 1));
    assert_eq!(committed(&runner), 0);

    // Arrives after the failed tick started; must wait for the next one.
    submit(&pool, 100, "0x64");

    let mut seen = Vec::new();
    runner
        .tick(|ecb, queue| {
            seen = queue.hashes();
            apply(ecb, queue)
        })
        .unwrap();
    assert_eq!(seen, vec![TxHash::new("0x07")]);
    assert_eq!(committed(&runner), 7);

    runner.tick(apply).unwrap();
    assert_eq!(committed(&runner), 107);
}

#[test]
fn test_finalize_failure_leaves_tick_in_flight() {
    let storage = Arc::new(MemoryStorage::new());
    let mut runner = open_runner(Arc::clone(&storage));
    runner.tick(create_counter).unwrap();
    let before = storage.snapshot();

    submit(&runner.pool(), 4, "0x04");
    let err = runner
        .tick(|ecb, queue| {
            apply(ecb, queue)?;
            ecb.storage().fail_next_transaction();
            Ok(())
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
    assert_eq!(runner.tick_numbers().unwrap(), (2, 1));
    assert_eq!(committed(&runner), 0);

    // Only the start of the tick reached the store.
    let mut after = storage.snapshot();
    assert_eq!(after[ecb_storage::keys::START_TICK], b"2");
    after.remove(ecb_storage::keys::START_TICK);
    after.remove(ecb_storage::keys::PENDING_TRANSACTIONS);
    let mut before = before;
    before.remove(ecb_storage::keys::START_TICK);
    before.remove(ecb_storage::keys::PENDING_TRANSACTIONS);
    assert_eq!(after, before);

    assert_eq!(runner.tick(apply).unwrap(), 1);
    assert_eq!(committed(&runner), 4);
    assert_eq!(runner.tick_numbers().unwrap(), (2, 2));
}

#[test]
fn test_unknown_message_type_is_requeued() {
    let mut runner = open_runner(Arc::new(MemoryStorage::new()));
    let pool = runner.pool();
    pool.add_transaction(
        MessageTypeId::from_raw(42),
        serde_json::Value::Null,
        SignedTransaction::default().with_hash("0x2a"),
    );

    let err = runner.tick(create_counter).unwrap_err();
    assert!(matches!(err, TickError::UnknownMessageType(id) if id.raw() == 42));
    assert_eq!(runner.tick_numbers().unwrap(), (0, 0));
    assert_eq!(pool.len(), 1);
}

// ============================================================================
// Recovery Tests
// ============================================================================

/// Start a tick carrying two increments and stop before finalizing.
fn crash_mid_tick<S: PrimitiveStorage>(storage: Arc<S>) -> Vec<TxHash> {
    let mut runner = open_runner(storage);
    runner.tick(create_counter).unwrap();

    let pool = runner.pool();
    submit(&pool, 2, "0xaa");
    submit(&pool, 3, "0xbb");
    let queue = pool.copy_transactions();

    let messages = messages();
    let ecb = runner.state_mut().ecb().unwrap();
    ecb.start_next_tick(&messages, &queue).unwrap();
    apply(ecb, &queue).unwrap();
    queue.hashes()
}

#[test]
fn test_recover_after_crash() {
    let storage = Arc::new(MemoryStorage::new());
    let submitted = crash_mid_tick(Arc::clone(&storage));

    let mut state = open_state(Arc::clone(&storage));
    let ecb = state.ecb().unwrap();
    assert_eq!(ecb.get_tick_numbers().unwrap(), (2, 1));
    assert_eq!(ecb.get_component::<Counter>(COUNTER).unwrap().n, 0);

    let err = ecb.start_next_tick(&messages(), &TxQueue::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Recovery);

    let recovered = ecb.recover(&messages()).unwrap();
    assert_eq!(recovered.len(), submitted.len());
    assert_eq!(recovered.hashes(), submitted);
    let first = &recovered.for_message(INCREMENT)[0];
    assert_eq!(first.tx.hash, TxHash::new("0xaa"));
    assert_eq!(first.tx.persona_tag, "tester");
}

#[test]
fn test_runner_resumes_interrupted_tick() {
    let storage = Arc::new(MemoryStorage::new());
    let submitted = crash_mid_tick(Arc::clone(&storage));

    let mut runner = open_runner(Arc::clone(&storage));
    assert!(runner.needs_recovery().unwrap());

    let mut seen = Vec::new();
    let tick = runner
        .tick(|ecb, queue| {
            seen = queue.hashes();
            apply(ecb, queue)
        })
        .unwrap();
    assert_eq!(tick, 1);
    assert_eq!(seen, submitted);
    assert_eq!(committed(&runner), 5);
    assert!(!runner.needs_recovery().unwrap());
}

#[test]
fn test_runner_recovers_lazily_when_disabled() {
    let storage = Arc::new(MemoryStorage::new());
    crash_mid_tick(Arc::clone(&storage));

    let config = TickConfig {
        recover_on_start: false,
    };
    let mut runner = TickRunner::open(open_state(Arc::clone(&storage)), messages(), config).unwrap();
    assert!(runner.needs_recovery().unwrap());

    runner.tick(apply).unwrap();
    assert_eq!(committed(&runner), 5);
}

#[test]
fn test_recover_without_record_fails() {
    let storage = Arc::new(MemoryStorage::new());
    storage.incr(ecb_storage::keys::START_TICK).unwrap();

    let mut state = open_state(Arc::clone(&storage));
    let err = state.ecb().unwrap().recover(&messages()).unwrap_err();
    assert!(matches!(err, TickError::NoPendingTransactions));

    let err = TickRunner::open(open_state(storage), messages(), TickConfig::default())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Recovery);
}

#[test]
fn test_finalize_without_start_is_refused() {
    let storage = Arc::new(MemoryStorage::new());
    let mut state = open_state(Arc::clone(&storage));
    let ecb = state.ecb().unwrap();
    ecb.create_entity(&[&Counter::default()]).unwrap();

    let err = TickStorage::finalize_tick(ecb).unwrap_err();
    assert!(matches!(err, TickError::NoTickInFlight { start: 0, end: 0 }));
    assert_eq!(ecb.get_tick_numbers().unwrap(), (0, 0));
    assert!(storage.snapshot().get(ecb_storage::keys::END_TICK).is_none());

    // The state still opens cleanly and the buffered entity lands in tick 0.
    let mut runner = TickRunner::open(state, messages(), TickConfig::default()).unwrap();
    assert!(!runner.needs_recovery().unwrap());
    assert_eq!(runner.tick(|_, _| Ok(())).unwrap(), 0);
    assert_eq!(committed(&runner), 0);
    assert_eq!(runner.tick_numbers().unwrap(), (1, 1));
}

#[test]
fn test_open_after_clean_finalize() {
    let storage = Arc::new(MemoryStorage::new());
    {
        let mut runner = open_runner(Arc::clone(&storage));
        runner.tick(create_counter).unwrap();
        submit(&runner.pool(), 6, "0x06");
        runner.tick(apply).unwrap();
    }

    let mut runner = open_runner(Arc::clone(&storage));
    assert_eq!(runner.tick_numbers().unwrap(), (2, 2));
    assert!(!runner.needs_recovery().unwrap());
    assert!(!runner.recover_if_needed().unwrap());
    assert_eq!(committed(&runner), 6);

    submit(&runner.pool(), 1, "0x01");
    assert_eq!(runner.tick(apply).unwrap(), 2);
    assert_eq!(committed(&runner), 7);
}

#[test]
fn test_open_requires_init() {
    let state = GameState::new(MemoryStorage::new());
    let err = TickRunner::open(state, messages(), TickConfig::default())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Lifecycle);
}

#[test]
fn test_default_config_recovers() {
    assert!(TickConfig::default().recover_on_start);
}

// ============================================================================
// LMDB Tests
// ============================================================================

#[test]
fn test_lmdb_recovery_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = LmdbConfig::default()
        .with_path(dir.path())
        .with_map_size(16 * 1024 * 1024);

    let submitted = {
        let storage = Arc::new(LmdbStorage::open(&config).unwrap());
        let hashes = crash_mid_tick(Arc::clone(&storage));
        storage.close().unwrap();
        hashes
    };

    let mut runner = open_runner(Arc::new(LmdbStorage::open(&config).unwrap()));
    let mut seen = Vec::new();
    runner
        .tick(|ecb, queue| {
            seen = queue.hashes();
            apply(ecb, queue)
        })
        .unwrap();
    assert_eq!(seen, submitted);
    assert_eq!(committed(&runner), 5);
}
