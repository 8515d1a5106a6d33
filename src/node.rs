//! The shared substrate every worker thread operates on: block tree, state
//! cache, peer bookkeeping, work queues and on-disk persistence. Grounded on
//! `kmacoin/atnode/node.py`.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};

use log::warn;

use crate::config::NodeConfig;
use crate::consensus::ExtendedState;
use crate::crypto::{hash_of_null, Hash, PrivateKey};
use crate::error::{BlockError, Error, Result};
use crate::event::{BlockEventSink, NullSink};
use crate::structures::{BlockTree, Pool, Semaphore, StateCache};
use crate::types::{Block, Transaction};
use crate::wire::Addr;

/// Capacity of the state cache, in distinct post-block states held at once.
const STATE_CACHE_SIZE: usize = 5;

/// Directory tree depth under which block files are sharded.
const DIR_DEPTH: usize = 2;

const BLOCK_ID_FILENAME: &str = "block_ids.data";
const KEY_FILENAME: &str = "key";

/// A thread-safe unbounded FIFO, standing in for Python's `queue.Queue`.
pub struct WorkQueue<T> {
    inner: Mutex<VecDeque<T>>,
    cv: Condvar,
}

impl<T> WorkQueue<T> {
    fn new() -> Self {
        Self { inner: Mutex::new(VecDeque::new()), cv: Condvar::new() }
    }

    pub fn push(&self, item: T) {
        self.inner.lock().expect("queue mutex poisoned").push_back(item);
        self.cv.notify_one();
    }

    /// Block until an item is available.
    pub fn pop(&self) -> T {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        loop {
            if let Some(item) = inner.pop_front() {
                return item;
            }
            inner = self.cv.wait(inner).expect("queue mutex poisoned");
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Commands a client thread executes against its outbound socket, queued up
/// by broadcasters/branch builders so they never block on peer I/O.
pub enum ClientCmd {
    Send(Vec<u8>),
    Inform(Vec<u8>, Vec<u8>),
    ReqBlock(Hash, mpsc::Sender<Option<Block>>),
}

/// A handle to a locally running client thread: its command channel, plus an
/// id used for equality/exclusion (a `Sender` carries no identity of its
/// own).
#[derive(Clone, Debug)]
pub struct ClientHandle {
    pub id: u64,
    pub tx: mpsc::Sender<ClientCmd>,
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ClientHandle {}

/// A block paired with the peer link it arrived on — `None` for a block
/// this node mined itself. Used for both `block_queue` and `orphan_queue`,
/// and to tell the branch builder which peer to ask for missing ancestors.
///
/// The reference implementation gets away with one `Block` type for both
/// cases by duck-typing an `XObject` wrapper transparently over it; Rust
/// needs the wrapping to be explicit, so the queue carries `QueuedBlock`
/// instead of `Block` directly.
pub struct QueuedBlock {
    pub block: Block,
    pub partner: Option<ClientHandle>,
}

/// An address paired with the protocol message it arrived with and the peer
/// link it came in on, if any.
pub struct QueuedAddr {
    pub addr: Addr,
    pub typecode: u8,
    pub partner: Option<ClientHandle>,
}

/// Something a client thread may be asked to relay on behalf of a worker.
/// `partner` is the peer link to exclude from the broadcast (the one the
/// object came from); `None` means broadcast to every connected peer, as for
/// objects this node produced itself (a mined block, a fee-paying wallet
/// transaction).
pub enum ValidObject {
    Transaction(Transaction, Option<ClientHandle>),
    Block(Block, Option<ClientHandle>),
    Address(Addr, Option<ClientHandle>),
}

/// The node's addressable, thread-shared state. Every worker thread holds an
/// `Arc<Node>` and operates on it concurrently; methods document their own
/// thread-safety.
pub struct Node {
    pub state_cache: StateCache,
    pub block_tree: Mutex<BlockTree>,
    pub event_sink: Arc<dyn BlockEventSink>,

    addrs: Mutex<AddrState>,
    addrs_cv: Condvar,

    pub client_cmd_queues: Mutex<Vec<ClientHandle>>,
    pub client_cmd_queues_cv: Condvar,
    next_client_id: Mutex<u64>,

    pub public_addr: Option<Addr>,
    pub listening_addr: Option<Addr>,

    pub data_dir: PathBuf,

    pub tx_id_pool: Pool<Hash>,
    pub block_id_pool: Pool<Hash>,
    pub addr_pool: Pool<Addr>,
    pub token_pool: Pool<[u8; 4], Arc<Mutex<Option<ClientHandle>>>>,

    pub tx_queue: WorkQueue<(Transaction, Option<ClientHandle>)>,
    pub block_queue: WorkQueue<QueuedBlock>,
    pub addr_queue: WorkQueue<QueuedAddr>,
    pub valid_obj_queue: WorkQueue<ValidObject>,
    pub orphan_queue: WorkQueue<QueuedBlock>,

    pub miner_module: String,
    pub hash_rate: u64,
    pub owner: PrivateKey,

    pub min_peers: usize,
    pub max_peers: usize,
    pub peers_smp: Semaphore,

    pub connection_timeout: std::time::Duration,
    pub peer_timeout: std::time::Duration,

    pub verbose: bool,
    pub hexlen: usize,
}

struct AddrState {
    unconnected: HashSet<Addr>,
    connected: HashSet<Addr>,
}

impl Node {
    pub fn new(config: &NodeConfig, data_dir: PathBuf, owner: PrivateKey) -> Self {
        let state_cache = StateCache::new(STATE_CACHE_SIZE);
        state_cache.insert(hash_of_null(), ExtendedState::new());

        let mut connected = HashSet::new();
        if let Some(addr) = &config.public_address {
            connected.insert(addr.clone());
        }

        Self {
            state_cache,
            block_tree: Mutex::new(BlockTree::new()),
            event_sink: Arc::new(NullSink),
            addrs: Mutex::new(AddrState {
                unconnected: config.initial_peer_addresses.iter().cloned().collect(),
                connected,
            }),
            addrs_cv: Condvar::new(),
            client_cmd_queues: Mutex::new(Vec::new()),
            client_cmd_queues_cv: Condvar::new(),
            next_client_id: Mutex::new(0),
            public_addr: config.public_address.clone(),
            listening_addr: config.listening_address.clone(),
            data_dir,
            tx_id_pool: Pool::new(config.transaction_id_pool_size),
            block_id_pool: Pool::new(config.block_id_pool_size),
            addr_pool: Pool::new(config.address_pool_size),
            token_pool: Pool::new(config.token_pool_size),
            tx_queue: WorkQueue::new(),
            block_queue: WorkQueue::new(),
            addr_queue: WorkQueue::new(),
            valid_obj_queue: WorkQueue::new(),
            orphan_queue: WorkQueue::new(),
            miner_module: config.miner_module.clone(),
            hash_rate: config.hash_rate,
            owner,
            min_peers: config.min_peers,
            max_peers: config.max_peers,
            peers_smp: Semaphore::new(config.max_peers * 2),
            connection_timeout: config.connection_timeout,
            peer_timeout: config.peer_timeout,
            verbose: config.verbose,
            hexlen: config.hex_string_length,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn BlockEventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn next_client_handle(&self, tx: mpsc::Sender<ClientCmd>) -> ClientHandle {
        let mut next = self.next_client_id.lock().expect("client id mutex poisoned");
        let id = *next;
        *next += 1;
        ClientHandle { id, tx }
    }

    pub fn register_client(&self, handle: ClientHandle) {
        self.client_cmd_queues.lock().expect("client queues mutex poisoned").push(handle);
    }

    pub fn unregister_client(&self, handle: &ClientHandle) {
        let mut queues = self.client_cmd_queues.lock().expect("client queues mutex poisoned");
        queues.retain(|h| h != handle);
        if queues.len() < self.min_peers {
            self.client_cmd_queues_cv.notify_all();
        }
    }

    pub fn wait_for_peer_shortage(&self) {
        let queues = self.client_cmd_queues.lock().expect("client queues mutex poisoned");
        let _unused = self
            .client_cmd_queues_cv
            .wait_while(queues, |q| q.len() >= self.min_peers)
            .expect("client queues mutex poisoned");
    }

    pub fn add_unconnected_address(&self, addr: Addr) -> bool {
        let mut state = self.addrs.lock().expect("addrs mutex poisoned");
        if state.connected.contains(&addr) {
            return false;
        }
        if state.unconnected.insert(addr) {
            self.addrs_cv.notify_all();
            true
        } else {
            false
        }
    }

    pub fn add_connected_address(&self, addr: Addr) -> bool {
        let mut state = self.addrs.lock().expect("addrs mutex poisoned");
        state.unconnected.remove(&addr);
        state.connected.insert(addr)
    }

    pub fn remove_connected_address(&self, addr: &Addr) -> bool {
        self.addrs.lock().expect("addrs mutex poisoned").connected.remove(addr)
    }

    pub fn is_unconnected(&self, addr: &Addr) -> bool {
        self.addrs.lock().expect("addrs mutex poisoned").unconnected.contains(addr)
    }

    pub fn is_connected(&self, addr: &Addr) -> bool {
        self.addrs.lock().expect("addrs mutex poisoned").connected.contains(addr)
    }

    pub fn has_no_unconnected_addresses(&self) -> bool {
        self.addrs.lock().expect("addrs mutex poisoned").unconnected.is_empty()
    }

    /// Snapshot of every address this node knows about (connected or not),
    /// for answering `REQ_ADDR_LIST`.
    pub fn known_addresses(&self) -> Vec<Addr> {
        let state = self.addrs.lock().expect("addrs mutex poisoned");
        state.unconnected.iter().chain(state.connected.iter()).cloned().collect()
    }

    pub fn pop_random_unconnected_address(&self) -> Addr {
        use rand::seq::IteratorRandom;
        let mut state = self.addrs.lock().expect("addrs mutex poisoned");
        loop {
            if let Some(addr) = state.unconnected.iter().choose(&mut rand::thread_rng()).cloned() {
                state.unconnected.remove(&addr);
                return addr;
            }
            state = self.addrs_cv.wait(state).expect("addrs mutex poisoned");
        }
    }

    /// Try once to pop a random unconnected address without blocking.
    pub fn try_pop_unconnected_address(&self) -> Option<Addr> {
        use rand::seq::IteratorRandom;
        let mut state = self.addrs.lock().expect("addrs mutex poisoned");
        let addr = state.unconnected.iter().choose(&mut rand::thread_rng()).cloned()?;
        state.unconnected.remove(&addr);
        Some(addr)
    }

    /// Path where a block's raw bytes are or will be stored, sharded by the
    /// last `2*DIR_DEPTH` hex characters of its id.
    pub fn get_block_path(&self, block_id: &Hash, make_dir: bool) -> Result<PathBuf> {
        let block_id_h = hex::encode(block_id);
        let shard_start = block_id_h.len() - 2 * DIR_DEPTH;
        let mut dir = self.data_dir.clone();
        let mut i = shard_start;
        while i < block_id_h.len() {
            dir.push(&block_id_h[i..i + 2]);
            i += 2;
        }

        if make_dir {
            fs::create_dir_all(&dir)?;
        }

        Ok(dir.join(&block_id_h[..block_id_h.len() - 2 * DIR_DEPTH]))
    }

    pub fn save_block_data(&self, block_data: &[u8], block_id: &Hash) -> Result<()> {
        let path = self.get_block_path(block_id, true)?;
        fs::write(path, block_data)?;
        Ok(())
    }

    pub fn load_block_data(&self, block_id: &Hash) -> Result<Vec<u8>> {
        let path = self.get_block_path(block_id, false)?;
        Ok(fs::read(path)?)
    }

    pub fn save_block(&self, block: &Block) -> Result<()> {
        let id = block.id();
        self.save_block_data(&block.to_bytes(), &id)?;

        let mut f = fs::OpenOptions::new().create(true).append(true).open(self.data_dir.join(BLOCK_ID_FILENAME))?;
        f.write_all(&id)?;
        Ok(())
    }

    pub fn load_block(&self, block_id: &Hash) -> Result<Block> {
        let bytes = self.load_block_data(block_id)?;
        Ok(Block::read_from(&mut bytes.as_slice())?)
    }

    /// Persist the owner private key to `data_dir/key`.
    pub fn save_key(data_dir: &Path, key: &PrivateKey) -> Result<()> {
        fs::write(data_dir.join(KEY_FILENAME), key.to_bytes())?;
        Ok(())
    }

    /// Load the owner private key from `data_dir/key`, if present.
    pub fn load_key(data_dir: &Path) -> Result<Option<PrivateKey>> {
        let path = data_dir.join(KEY_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        let arr: [u8; crate::crypto::PRIVATE_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::CorruptDataDir("private key file has the wrong length".to_string()))?;
        PrivateKey::from_bytes(&arr)
            .map(Some)
            .ok_or_else(|| Error::CorruptDataDir("private key file is not a valid key".to_string()))
    }

    /// Add a block to the tree: checks for a duplicate or orphan, validates
    /// it against the state at its parent, updates tree and cache, and
    /// (optionally) persists it. `partner` identifies the peer link the
    /// block arrived on (`None` for a block this node mined), threaded
    /// through to `orphan_queue` so the branch builder knows who to ask for
    /// missing ancestors.
    ///
    /// Not safe to call from more than one thread concurrently — the caller
    /// (the block processor, or bootstrap replay) is the sole writer.
    pub fn add_block(&self, block: Block, save: bool, partner: Option<ClientHandle>) -> Result<bool> {
        let id = block.id();

        if self.block_tree.lock().expect("block tree mutex poisoned").has_block(&id) {
            return Ok(false);
        }

        if !self.block_tree.lock().expect("block tree mutex poisoned").has_block(&block.prev_id) {
            self.orphan_queue.push(QueuedBlock { block, partner });
            return Ok(false);
        }

        let mut state = self.get_state(&block.prev_id)?;
        state.process_block(&block).map_err(Error::Block)?;

        self.state_cache.insert(id, state);

        {
            let mut tree = self.block_tree.lock().expect("block tree mutex poisoned");
            tree.add(id, block.prev_id);
        }

        let reward_owner = block.txs[0].outputs[0].owner;
        self.event_sink.on_block(id, block.prev_id, reward_owner);

        if save {
            self.save_block(&block)?;
        }

        Ok(true)
    }

    /// The extended state right after `block_id` was applied. Reconstructed
    /// by replaying from disk if it has aged out of the cache.
    pub fn get_state(&self, block_id: &Hash) -> Result<ExtendedState> {
        if let Some(state) = self.state_cache.get(block_id) {
            return Ok(state);
        }

        let mut state = ExtendedState::new();
        let path = self.block_tree.lock().expect("block tree mutex poisoned").get_path(block_id);
        for bid in path {
            if bid == hash_of_null() {
                continue;
            }
            let block = self.load_block(&bid)?;
            state.process_block(&block).map_err(Error::Block)?;
        }
        Ok(state)
    }

    pub fn get_latest_state(&self) -> Result<ExtendedState> {
        let top = self.block_tree.lock().expect("block tree mutex poisoned").get_top_block();
        self.get_state(&top)
    }

    pub fn block_height(&self) -> usize {
        self.block_tree.lock().expect("block tree mutex poisoned").get_height()
    }

    /// Replay blocks recorded in `block_ids.data` from a previous run into
    /// the tree, without re-persisting them. Returns the number added.
    pub fn resume_from_disk(&self) -> Result<usize> {
        let path = self.data_dir.join(BLOCK_ID_FILENAME);
        if !path.exists() {
            return Ok(0);
        }

        let ids = fs::read(path)?;
        let mut count = 0;
        for chunk in ids.chunks(32) {
            let block_id: Hash = chunk
                .try_into()
                .map_err(|_| Error::CorruptDataDir("block id index has the wrong length".to_string()))?;
            let block = self.load_block(&block_id)?;
            self.add_block(block, false, None)?;
            count += 1;
        }
        Ok(count)
    }
}

pub fn log_invalid_block(node: &Node, block: &Block, err: &BlockError) {
    warn!(target: "kma_coin::node", "rejected invalid block {}...: {err}", &hex::encode(block.id())[..node.hexlen]);
}
