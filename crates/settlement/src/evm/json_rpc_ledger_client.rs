use crate::domain::{LedgerClient, LedgerError, LedgerResult, TransferRequest};
use crate::evm::abi::{
    encode_balance_of, encode_transfer, format_address, parse_address, parse_quantity,
    to_hex_data,
};
use crate::evm::nonce_manager::NonceManager;
use crate::evm::signer::{LegacyTransaction, TransactionSigner};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

/// Ledger client for an ERC-20 style token on an EVM node
///
/// The owner key never leaves the process: transfers are signed locally and
/// sent raw. The chain id is fetched once and cached. Nonces are allocated
/// locally so concurrent transfers never share one.
pub struct JsonRpcLedgerClient {
    http_client: reqwest::Client,
    rpc_url: String,
    contract: [u8; 20],
    signer: TransactionSigner,
    request_id: AtomicU64,
    chain_id: OnceCell<u64>,
    nonces: NonceManager,
    timeout: Duration,
}

impl JsonRpcLedgerClient {
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: &str,
        signer: TransactionSigner,
        timeout: Duration,
    ) -> LedgerResult<Self> {
        let contract = parse_address(contract_address)?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            contract,
            signer,
            request_id: AtomicU64::new(1),
            chain_id: OnceCell::new(),
            nonces: NonceManager::default(),
            timeout,
        })
    }

    /// Address that signs and funds transfers
    pub fn owner_address(&self) -> &str {
        self.signer.address()
    }

    pub fn contract_address(&self) -> String {
        format_address(&self.contract)
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<R> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        debug!(method = %method, id, "ledger RPC call completed");
        into_result(method, body)
    }

    fn transport_error(&self, e: reqwest::Error) -> LedgerError {
        if e.is_timeout() {
            LedgerError::Timeout(self.timeout)
        } else if e.is_decode() {
            LedgerError::InvalidResponse(e.to_string())
        } else {
            LedgerError::Transport(e.to_string())
        }
    }

    async fn chain_id(&self) -> LedgerResult<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let raw: String = self.call("eth_chainId", json!([])).await?;
                to_u64(parse_quantity(&raw)?, "eth_chainId")
            })
            .await
            .copied()
    }

    async fn pending_nonce(&self) -> LedgerResult<u64> {
        let raw: String = self
            .call(
                "eth_getTransactionCount",
                json!([self.signer.address(), "pending"]),
            )
            .await?;
        to_u64(parse_quantity(&raw)?, "eth_getTransactionCount")
    }

    fn check_sender(&self, request: &TransferRequest) -> LedgerResult<()> {
        if request.from.eq_ignore_ascii_case(self.signer.address()) {
            Ok(())
        } else {
            Err(LedgerError::InvalidCredential(format!(
                "configured key controls {}, not {}",
                self.signer.address(),
                request.from
            )))
        }
    }
}

fn into_result<R>(method: &str, body: JsonRpcResponse<R>) -> LedgerResult<R> {
    if let Some(error) = body.error {
        return Err(LedgerError::Rpc {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        });
    }

    body.result
        .ok_or_else(|| LedgerError::InvalidResponse(format!("{} returned no result", method)))
}

fn to_u64(value: u128, method: &str) -> LedgerResult<u64> {
    u64::try_from(value)
        .map_err(|_| LedgerError::InvalidResponse(format!("{} result exceeds 64 bits", method)))
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    #[instrument(skip(self, request), fields(to = %request.to))]
    async fn estimate_transfer_cost(&self, request: &TransferRequest) -> LedgerResult<u64> {
        let to = parse_address(&request.to)?;
        let params = json!([{
            "from": request.from,
            "to": format_address(&self.contract),
            "data": to_hex_data(&encode_transfer(&to, request.amount)),
        }]);

        let raw: String = self.call("eth_estimateGas", params).await?;
        to_u64(parse_quantity(&raw)?, "eth_estimateGas")
    }

    #[instrument(skip(self, request), fields(to = %request.to))]
    async fn submit_transfer(
        &self,
        request: &TransferRequest,
        gas_limit: u64,
    ) -> LedgerResult<String> {
        self.check_sender(request)?;
        let to = parse_address(&request.to)?;

        let gas_price: String = self.call("eth_gasPrice", json!([])).await?;
        let gas_price = parse_quantity(&gas_price)?;
        let chain_id = self.chain_id().await?;

        let lease = self.nonces.lease(|| self.pending_nonce()).await?;
        let transaction = LegacyTransaction {
            nonce: lease.nonce(),
            gas_price,
            gas_limit,
            to: self.contract,
            value: 0,
            data: encode_transfer(&to, request.amount),
        };

        debug!(
            nonce = transaction.nonce,
            gas_price = %transaction.gas_price,
            chain_id,
            "signing reward transfer"
        );

        let raw = self.signer.sign_legacy(&transaction, chain_id)?;
        match self
            .call::<String>("eth_sendRawTransaction", json!([to_hex_data(&raw)]))
            .await
        {
            Ok(transaction_id) => {
                lease.commit();
                Ok(transaction_id)
            }
            Err(e) => {
                warn!(
                    nonce = transaction.nonce,
                    error = %e,
                    "raw transaction not accepted, resyncing nonce"
                );
                lease.invalidate();
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    async fn balance_of(&self, address: &str) -> LedgerResult<u128> {
        let owner = parse_address(address)?;
        let params = json!([
            {
                "to": format_address(&self.contract),
                "data": to_hex_data(&encode_balance_of(&owner)),
            },
            "latest"
        ]);

        let raw: String = self.call("eth_call", params).await?;
        parse_quantity(&raw)
    }

    async fn ensure_contract(&self) -> LedgerResult<()> {
        let code: String = self
            .call(
                "eth_getCode",
                json!([format_address(&self.contract), "latest"]),
            )
            .await?;

        if code.trim_start_matches("0x").is_empty() {
            return Err(LedgerError::ContractUnavailable(format!(
                "no code at {}",
                format_address(&self.contract)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const CONTRACT: &str = "0x00000000000000000000000000000000000000c0";

    fn client() -> JsonRpcLedgerClient {
        JsonRpcLedgerClient::new(
            "http://127.0.0.1:8545",
            CONTRACT,
            TransactionSigner::from_hex(KEY).unwrap(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_contract_address() {
        let result = JsonRpcLedgerClient::new(
            "http://127.0.0.1:8545",
            "0xnope",
            TransactionSigner::from_hex(KEY).unwrap(),
            Duration::from_secs(1),
        );

        assert!(matches!(result, Err(LedgerError::InvalidAddress(_))));
    }

    #[test]
    fn test_owner_address_comes_from_key() {
        let client = client();

        assert_eq!(
            client.owner_address(),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
        assert_eq!(client.contract_address(), CONTRACT);
    }

    #[test]
    fn test_rpc_error_body_maps_to_rpc_error() {
        let body: JsonRpcResponse<String> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "error": { "code": -32000, "message": "insufficient funds for gas * price + value" }
        }))
        .unwrap();

        let result = into_result("eth_sendRawTransaction", body);

        match result {
            Err(LedgerError::Rpc {
                method,
                code,
                message,
            }) => {
                assert_eq!(method, "eth_sendRawTransaction");
                assert_eq!(code, -32000);
                assert!(message.contains("insufficient funds"));
            }
            other => panic!("expected RPC error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_result_is_invalid_response() {
        let body: JsonRpcResponse<String> =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1 })).unwrap();

        assert!(matches!(
            into_result("eth_gasPrice", body),
            Err(LedgerError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_successful_result_is_returned() {
        let body: JsonRpcResponse<String> =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x5208" }))
                .unwrap();

        assert_eq!(into_result("eth_estimateGas", body).unwrap(), "0x5208");
    }

    #[tokio::test]
    async fn test_submit_rejects_foreign_sender_before_any_call() {
        let client = client();
        let request = TransferRequest {
            from: "0x0000000000000000000000000000000000000001".to_string(),
            to: "0x0000000000000000000000000000000000000002".to_string(),
            amount: 1,
        };

        let result = client.submit_transfer(&request, 60_000).await;

        assert!(matches!(result, Err(LedgerError::InvalidCredential(_))));
    }

    #[derive(Default)]
    struct StubNode {
        pending_nonce: AtomicU64,
        nonce_reads: AtomicUsize,
        rejections_left: AtomicUsize,
        raw_transactions: Mutex<Vec<String>>,
    }

    impl StubNode {
        fn sent_nonces(&self) -> Vec<u64> {
            self.raw_transactions
                .lock()
                .unwrap()
                .iter()
                .map(|raw| {
                    let bytes = hex::decode(raw.trim_start_matches("0x")).unwrap();
                    rlp::Rlp::new(&bytes).val_at::<u64>(0).unwrap()
                })
                .collect()
        }
    }

    async fn stub_rpc(State(node): State<Arc<StubNode>>, Json(request): Json<Value>) -> Json<Value> {
        let id = request["id"].clone();
        let result = match request["method"].as_str().unwrap_or_default() {
            "eth_getTransactionCount" => {
                node.nonce_reads.fetch_add(1, Ordering::SeqCst);
                json!(format!("0x{:x}", node.pending_nonce.load(Ordering::SeqCst)))
            }
            "eth_gasPrice" => json!("0x3b9aca00"),
            "eth_chainId" => json!("0x539"),
            "eth_sendRawTransaction" => {
                if node.rejections_left.load(Ordering::SeqCst) > 0 {
                    node.rejections_left.fetch_sub(1, Ordering::SeqCst);
                    return Json(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32000, "message": "nonce too low" }
                    }));
                }
                let raw = request["params"][0].as_str().unwrap_or_default().to_string();
                let mut sent = node.raw_transactions.lock().unwrap();
                sent.push(raw);
                json!(format!("0x{:064x}", sent.len()))
            }
            other => {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("{} not supported", other) }
                }));
            }
        };

        Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }

    async fn start_stub_node(node: Arc<StubNode>) -> String {
        let app = Router::new().route("/", post(stub_rpc)).with_state(node);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", address)
    }

    fn reward_to(client: &JsonRpcLedgerClient) -> TransferRequest {
        TransferRequest {
            from: client.owner_address().to_string(),
            to: "0x00000000000000000000000000000000000000a1".to_string(),
            amount: 1_000_000_000_000_000_000,
        }
    }

    async fn client_for(node: &Arc<StubNode>) -> JsonRpcLedgerClient {
        let url = start_stub_node(Arc::clone(node)).await;
        JsonRpcLedgerClient::new(
            url,
            CONTRACT,
            TransactionSigner::from_hex(KEY).unwrap(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_submits_sign_distinct_nonces() {
        // Arrange
        let node = Arc::new(StubNode::default());
        node.pending_nonce.store(7, Ordering::SeqCst);
        let client = client_for(&node).await;
        let request = reward_to(&client);

        // Act
        let (first, second) = tokio::join!(
            client.submit_transfer(&request, 60_000),
            client.submit_transfer(&request, 60_000)
        );

        // Assert
        assert!(first.is_ok());
        assert!(second.is_ok());
        let mut nonces = node.sent_nonces();
        nonces.sort_unstable();
        assert_eq!(nonces, vec![7, 8]);
        assert_eq!(node.nonce_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_send_resyncs_nonce_from_node() {
        // Arrange
        let node = Arc::new(StubNode::default());
        node.pending_nonce.store(7, Ordering::SeqCst);
        let client = client_for(&node).await;
        let request = reward_to(&client);

        // Act
        client.submit_transfer(&request, 60_000).await.unwrap();
        node.rejections_left.store(1, Ordering::SeqCst);
        let rejected = client.submit_transfer(&request, 60_000).await;
        node.pending_nonce.store(9, Ordering::SeqCst);
        client.submit_transfer(&request, 60_000).await.unwrap();

        // Assert
        assert!(matches!(rejected, Err(LedgerError::Rpc { .. })));
        assert_eq!(node.sent_nonces(), vec![7, 9]);
        assert_eq!(node.nonce_reads.load(Ordering::SeqCst), 2);
    }
}
