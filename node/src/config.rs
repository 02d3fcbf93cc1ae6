//! Network-wide tunables threaded through the VM engine, the resource meter
//! and the catch-up indexer. Parsing these from a config file or CLI flags
//! lives outside the core; this is just the typed settings bag and its
//! implementation defaults.

#[derive(Clone, Copy, Debug)]
pub struct NetworkConfig {
    // -- VM engine --
    pub memory_pages_limit: u32,
    pub max_call_depth: usize,
    pub module_cache_capacity: usize,
    /// Mirrors `chain_vm::context::MAX_FRAME_DEPTH`; carried here so callers
    /// building tooling around the node don't need to depend on `chain-vm`
    /// just to read the frame-depth ceiling.
    pub max_frame_depth: usize,

    // -- Resource pricing: rc per unit consumed --
    pub disk_storage_cost: u64,
    pub network_bandwidth_cost: u64,
    pub compute_bandwidth_cost: u64,
    pub compute_bandwidth_limit: u64,

    // -- Catch-up indexer --
    pub indexer_request_queue_depth: usize,
    pub indexer_block_queue_depth: usize,
    pub indexer_initial_batch_size: u64,
    pub indexer_max_batch_size: u64,
    pub indexer_rpc_timeout_ms: u64,

    // -- RPC --
    pub rpc_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            memory_pages_limit: 512,
            max_call_depth: 251,
            module_cache_capacity: 256,
            max_frame_depth: chain_vm::context::MAX_FRAME_DEPTH,

            disk_storage_cost: 1,
            network_bandwidth_cost: 1,
            compute_bandwidth_cost: 1,
            compute_bandwidth_limit: u64::MAX,

            indexer_request_queue_depth: 100,
            indexer_block_queue_depth: 100,
            indexer_initial_batch_size: 50,
            indexer_max_batch_size: 1000,
            indexer_rpc_timeout_ms: 5000,

            rpc_timeout_ms: 750,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_implementation_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.memory_pages_limit, 512);
        assert_eq!(config.max_call_depth, 251);
        assert_eq!(config.max_frame_depth, chain_vm::context::MAX_FRAME_DEPTH);
        assert_eq!(config.indexer_initial_batch_size, 50);
        assert_eq!(config.indexer_max_batch_size, 1000);
        assert_eq!(config.rpc_timeout_ms, 750);
    }
}
