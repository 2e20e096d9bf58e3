use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::Txid;
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::types::TxNode;

use super::{BackendRequest, BackendResponse, BackendTransport};

/// A request as seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// `true` when sent through `send_and_retry`.
    pub retrying: bool,
}

impl RecordedRequest {
    /// Values of every `transactionIds` query parameter, in order.
    pub fn requested_txids(&self) -> Vec<String> {
        query_values(&self.path, "transactionIds")
    }
}

/// A mock backend for testing.
///
/// Scripted responses are served first, in order. Once they run out,
/// `transaction-hexes` requests are answered from the known transactions
/// and anything else gets a 404.
pub struct MockTransport {
    transactions: HashMap<Txid, String>,
    scripted: Mutex<VecDeque<Result<BackendResponse, CoreError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder {
            transactions: HashMap::new(),
            scripted: VecDeque::new(),
            cancel_after: None,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }

    fn handle(
        &self,
        request: BackendRequest,
        retrying: bool,
    ) -> Result<BackendResponse, CoreError> {
        let served = {
            let mut requests = self.requests.lock().expect("mock lock poisoned");
            requests.push(RecordedRequest {
                method: request.method.clone(),
                path: request.path.clone(),
                body: request.body.clone(),
                retrying,
            });
            requests.len()
        };

        let response = self.respond(&request.path);

        if let Some((after, token)) = &self.cancel_after {
            if served == *after {
                token.cancel();
            }
        }
        response
    }

    fn respond(&self, path: &str) -> Result<BackendResponse, CoreError> {
        if let Some(scripted) = self.scripted.lock().expect("mock lock poisoned").pop_front() {
            return scripted;
        }

        if path.contains("/btc/blockchain/transaction-hexes") {
            let hexes: Vec<&String> = query_values(path, "transactionIds")
                .iter()
                .filter_map(|id| id.parse::<Txid>().ok())
                .filter_map(|txid| self.transactions.get(&txid))
                .collect();
            let body = serde_json::to_string(&hexes).expect("hex list serializes");
            return Ok(BackendResponse::new(StatusCode::OK, body));
        }

        Ok(BackendResponse::new(StatusCode::NOT_FOUND, "\"Not found.\""))
    }
}

pub struct MockTransportBuilder {
    transactions: HashMap<Txid, String>,
    scripted: VecDeque<Result<BackendResponse, CoreError>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MockTransportBuilder {
    pub fn with_tx(mut self, node: &TxNode) -> Self {
        self.transactions.insert(node.txid, node.to_hex());
        self
    }

    pub fn with_txs<'a>(mut self, nodes: impl IntoIterator<Item = &'a TxNode>) -> Self {
        for node in nodes {
            self = self.with_tx(node);
        }
        self
    }

    pub fn respond(mut self, status: StatusCode, body: &str) -> Self {
        self.scripted
            .push_back(Ok(BackendResponse::new(status, body)));
        self
    }

    pub fn fail(mut self, error: CoreError) -> Self {
        self.scripted.push_back(Err(error));
        self
    }

    /// Cancel `token` right after the `n`-th request has been answered.
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn build(self) -> MockTransport {
        MockTransport {
            transactions: self.transactions,
            scripted: Mutex::new(self.scripted),
            requests: Mutex::new(Vec::new()),
            cancel_after: self.cancel_after,
        }
    }
}

#[async_trait]
impl BackendTransport for MockTransport {
    async fn send(&self, request: BackendRequest) -> Result<BackendResponse, CoreError> {
        self.handle(request, false)
    }

    async fn send_and_retry(&self, request: BackendRequest) -> Result<BackendResponse, CoreError> {
        self.handle(request, true)
    }
}

fn query_values(path: &str, key: &str) -> Vec<String> {
    let Some((_, query)) = path.split_once('?') else {
        return Vec::new();
    };
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v.to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[tokio::test]
    async fn serves_known_transactions_by_query() {
        let known = make_tx_node(1, &[]);
        let mock = MockTransport::builder().with_tx(&known).build();

        let path = format!(
            "/api/v3/btc/blockchain/transaction-hexes?transactionIds={}&transactionIds={}",
            known.txid,
            txid_from_byte(7)
        );
        let resp = mock
            .send_and_retry(BackendRequest::get(path))
            .await
            .expect("mock responds");
        let hexes: Vec<String> = resp.json().expect("json");
        assert_eq!(hexes, vec![known.to_hex()]);

        let recorded = mock.requests();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].retrying);
        assert_eq!(recorded[0].requested_txids().len(), 2);
    }

    #[tokio::test]
    async fn scripted_responses_come_first() {
        let mock = MockTransport::builder()
            .respond(StatusCode::CONFLICT, "")
            .build();

        let first = mock
            .send(BackendRequest::get("/anything"))
            .await
            .expect("scripted");
        assert_eq!(first.status, StatusCode::CONFLICT);

        let second = mock
            .send(BackendRequest::get("/anything"))
            .await
            .expect("fallback");
        assert_eq!(second.status, StatusCode::NOT_FOUND);
    }
}
