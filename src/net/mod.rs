pub mod bundle_client;
pub mod metadata_client;
pub mod price_client;
pub mod quote_client;
pub mod rpc_client;
pub mod stream_client;
