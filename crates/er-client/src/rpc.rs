//! JSON-RPC Ledger Client
//!
//! Speaks the Solana-compatible JSON-RPC dialect over HTTP. Both the base
//! ledger and the ephemeral rollup validator expose the same methods:
//! getAccountInfo, getLatestBlockhash, sendTransaction, getSignatureStatuses.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use jsonrpsee::{
    core::{client::ClientT, ClientError},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_sdk::{
    account::Account, clock::Slot, commitment_config::CommitmentLevel, hash::Hash, pubkey::Pubkey,
    signature::Signature,
};
use std::{str::FromStr, time::Duration};

use crate::{
    error::LedgerError,
    ledger::{Ack, LedgerClient, SubmitOptions},
};

// ============ Response Types ============

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponseContext {
    pub slot: Slot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T> {
    pub context: RpcResponseContext,
    pub value: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountInfo {
    pub data: (String, String), // (data, encoding)
    pub executable: bool,
    pub lamports: u64,
    pub owner: String,
    #[serde(rename = "rentEpoch", default)]
    pub rent_epoch: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockhashInfo {
    pub blockhash: String,
    #[serde(rename = "lastValidBlockHeight")]
    pub last_valid_block_height: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignatureStatus {
    pub slot: Slot,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(rename = "confirmationStatus", default)]
    pub confirmation_status: Option<String>,
}

impl AccountInfo {
    /// Convert the wire representation into an `Account`
    pub fn into_account(self) -> Result<Account, LedgerError> {
        let (encoded, encoding) = self.data;
        let data = match encoding.as_str() {
            "base64" => BASE64
                .decode(&encoded)
                .map_err(|e| LedgerError::Decode(format!("account data: {}", e)))?,
            "base58" => bs58::decode(&encoded)
                .into_vec()
                .map_err(|e| LedgerError::Decode(format!("account data: {}", e)))?,
            other => {
                return Err(LedgerError::Decode(format!(
                    "unsupported account encoding: {}",
                    other
                )))
            }
        };
        let owner = Pubkey::from_str(&self.owner)
            .map_err(|e| LedgerError::Decode(format!("account owner: {}", e)))?;

        Ok(Account {
            lamports: self.lamports,
            data,
            owner,
            executable: self.executable,
            rent_epoch: self.rent_epoch,
        })
    }
}

impl SignatureStatus {
    /// Whether this status satisfies `commitment`
    pub fn reaches(&self, commitment: CommitmentLevel) -> bool {
        let observed = match self.confirmation_status.as_deref() {
            Some("finalized") => 2,
            Some("confirmed") => 1,
            Some("processed") => 0,
            // Older nodes omit the field; no confirmations left means rooted
            _ if self.confirmations.is_none() => 2,
            _ => 0,
        };
        observed >= commitment_rank(commitment)
    }
}

fn commitment_rank(commitment: CommitmentLevel) -> u8 {
    match commitment {
        CommitmentLevel::Processed => 0,
        CommitmentLevel::Confirmed => 1,
        CommitmentLevel::Finalized => 2,
    }
}

pub fn commitment_str(commitment: CommitmentLevel) -> &'static str {
    match commitment {
        CommitmentLevel::Processed => "processed",
        CommitmentLevel::Confirmed => "confirmed",
        CommitmentLevel::Finalized => "finalized",
    }
}

// ============ Client ============

/// Ledger client over Solana JSON-RPC
pub struct RpcLedgerClient {
    client: HttpClient,
    url: String,
    commitment: CommitmentLevel,
    poll_interval: Duration,
}

impl RpcLedgerClient {
    /// Connect to `url`; reads use `commitment`
    pub fn new(
        url: &str,
        commitment: CommitmentLevel,
        request_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, LedgerError> {
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(url)
            .map_err(|e| LedgerError::Transport(format!("{}: {}", url, e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            commitment,
            poll_interval,
        })
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        let response: RpcResponse<Vec<Option<SignatureStatus>>> = self
            .client
            .request(
                "getSignatureStatuses",
                rpc_params![
                    vec![signature.to_string()],
                    json!({ "searchTransactionHistory": false })
                ],
            )
            .await
            .map_err(transport_error)?;

        Ok(response.value.into_iter().next().flatten())
    }
}

fn transport_error(error: ClientError) -> LedgerError {
    LedgerError::Transport(error.to_string())
}

/// JSON-RPC call errors from sendTransaction are preflight or sanitization rejections
fn submission_error(error: ClientError) -> LedgerError {
    match error {
        ClientError::Call(call) => {
            let mut reason = call.message().to_string();
            if let Some(data) = call.data() {
                reason.push_str(": ");
                reason.push_str(data.get());
            }
            LedgerError::Rejected(reason)
        }
        other => LedgerError::Transport(other.to_string()),
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        let response: RpcResponse<Option<AccountInfo>> = self
            .client
            .request(
                "getAccountInfo",
                rpc_params![
                    address.to_string(),
                    json!({ "encoding": "base64", "commitment": commitment_str(self.commitment) })
                ],
            )
            .await
            .map_err(transport_error)?;

        tracing::debug!(
            "getAccountInfo {} on {} at slot {}: {}",
            address,
            self.url,
            response.context.slot,
            if response.value.is_some() { "found" } else { "absent" }
        );

        response.value.map(AccountInfo::into_account).transpose()
    }

    async fn get_recency_token(&self) -> Result<Hash, LedgerError> {
        let response: RpcResponse<BlockhashInfo> = self
            .client
            .request(
                "getLatestBlockhash",
                rpc_params![json!({ "commitment": commitment_str(self.commitment) })],
            )
            .await
            .map_err(transport_error)?;

        Hash::from_str(&response.value.blockhash)
            .map_err(|e| LedgerError::Decode(format!("blockhash: {}", e)))
    }

    async fn submit(
        &self,
        signed_tx: &[u8],
        opts: SubmitOptions,
    ) -> Result<Signature, LedgerError> {
        let signature: String = self
            .client
            .request(
                "sendTransaction",
                rpc_params![
                    BASE64.encode(signed_tx),
                    json!({
                        "encoding": "base64",
                        "skipPreflight": opts.skip_preflight,
                        "preflightCommitment": commitment_str(self.commitment),
                    })
                ],
            )
            .await
            .map_err(submission_error)?;

        Signature::from_str(&signature)
            .map_err(|e| LedgerError::Decode(format!("signature: {}", e)))
    }

    async fn confirm(
        &self,
        signature: &Signature,
        commitment: CommitmentLevel,
    ) -> Result<Ack, LedgerError> {
        loop {
            match self.signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        return Err(LedgerError::Rejected(err.to_string()));
                    }
                    if status.reaches(commitment) {
                        return Ok(Ack {
                            signature: *signature,
                            slot: status.slot,
                        });
                    }
                }
                Ok(None) => {}
                // Keep polling; the caller's deadline decides when to give up
                Err(e) => {
                    tracing::debug!("Status poll for {} on {} failed: {}", signature, self.url, e)
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_info_decodes_base64() {
        let owner = Pubkey::new_unique();
        let raw = json!({
            "context": { "slot": 42 },
            "value": {
                "data": [BASE64.encode([1u8, 2, 3]), "base64"],
                "executable": false,
                "lamports": 1_000_000,
                "owner": owner.to_string(),
                "rentEpoch": 18446744073709551615u64,
                "space": 3
            }
        });

        let response: RpcResponse<Option<AccountInfo>> = serde_json::from_value(raw).unwrap();
        assert_eq!(response.context.slot, 42);
        let account = response.value.unwrap().into_account().unwrap();
        assert_eq!(account.data, vec![1, 2, 3]);
        assert_eq!(account.owner, owner);
        assert_eq!(account.lamports, 1_000_000);
    }

    #[test]
    fn test_absent_account() {
        let raw = json!({ "context": { "slot": 7 }, "value": null });
        let response: RpcResponse<Option<AccountInfo>> = serde_json::from_value(raw).unwrap();
        assert!(response.value.is_none());
    }

    #[test]
    fn test_bad_owner_is_decode_error() {
        let info = AccountInfo {
            data: (String::new(), "base64".into()),
            executable: false,
            lamports: 0,
            owner: "not-a-pubkey".into(),
            rent_epoch: 0,
        };
        assert!(matches!(info.into_account(), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_signature_status_levels() {
        let status = |level: Option<&str>, confirmations: Option<u64>| SignatureStatus {
            slot: 1,
            confirmations,
            err: None,
            confirmation_status: level.map(String::from),
        };

        assert!(status(Some("processed"), Some(0)).reaches(CommitmentLevel::Processed));
        assert!(!status(Some("processed"), Some(0)).reaches(CommitmentLevel::Confirmed));
        assert!(status(Some("confirmed"), Some(3)).reaches(CommitmentLevel::Confirmed));
        assert!(!status(Some("confirmed"), Some(3)).reaches(CommitmentLevel::Finalized));
        assert!(status(Some("finalized"), None).reaches(CommitmentLevel::Finalized));
        assert!(status(None, None).reaches(CommitmentLevel::Finalized));
    }

    #[test]
    fn test_call_error_on_submit_is_rejection() {
        let call = jsonrpsee::types::ErrorObjectOwned::owned(
            -32002,
            "Transaction simulation failed: Blockhash not found",
            Some(json!({ "err": "BlockhashNotFound" })),
        );
        match submission_error(ClientError::Call(call)) {
            LedgerError::Rejected(reason) => {
                assert!(reason.starts_with("Transaction simulation failed: Blockhash not found: "));
                assert!(reason.contains("BlockhashNotFound"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_transport_failure_on_submit_is_not_rejection() {
        assert!(matches!(
            submission_error(ClientError::RequestTimeout),
            LedgerError::Transport(_)
        ));
    }

    #[test]
    fn test_signature_statuses_response() {
        let raw = json!({
            "context": { "slot": 100 },
            "value": [{
                "slot": 99,
                "confirmations": null,
                "err": { "InstructionError": [0, { "Custom": 1 }] },
                "confirmationStatus": "finalized"
            }]
        });
        let response: RpcResponse<Vec<Option<SignatureStatus>>> =
            serde_json::from_value(raw).unwrap();
        let status = response.value.into_iter().next().flatten().unwrap();
        assert!(status.err.is_some());
    }
}
