//! Stub ledger for unit tests

use async_trait::async_trait;
use solana_sdk::{
    account::Account, commitment_config::CommitmentLevel, hash::Hash, pubkey::Pubkey,
    signature::Signature,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use crate::{
    error::LedgerError,
    ledger::{Ack, LedgerClient, SubmitOptions},
};

/// Ledger that answers every read with a fixed reply and refuses writes
pub struct StubLedger {
    reply: Mutex<Result<Option<Account>, LedgerError>>,
    submissions: AtomicUsize,
}

impl StubLedger {
    pub fn with_account(account: Option<Account>) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(account)),
            submissions: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: LedgerError) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Err(error)),
            submissions: AtomicUsize::new(0),
        })
    }

    pub fn set_reply(&self, reply: Result<Option<Account>, LedgerError>) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for StubLedger {
    fn endpoint(&self) -> &str {
        "stub"
    }

    async fn get_account(&self, _address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        self.reply.lock().unwrap().clone()
    }

    async fn get_recency_token(&self) -> Result<Hash, LedgerError> {
        Ok(Hash::default())
    }

    async fn submit(
        &self,
        _signed_tx: &[u8],
        _opts: SubmitOptions,
    ) -> Result<Signature, LedgerError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Err(LedgerError::Rejected("stub ledger is read-only".into()))
    }

    async fn confirm(
        &self,
        _signature: &Signature,
        _commitment: CommitmentLevel,
    ) -> Result<Ack, LedgerError> {
        Err(LedgerError::Rejected("stub ledger is read-only".into()))
    }
}

pub fn account_owned_by(owner: Pubkey) -> Account {
    Account {
        lamports: 1,
        data: vec![],
        owner,
        executable: false,
        rent_epoch: 0,
    }
}

pub fn counter_account(owner: Pubkey, value: u32) -> Account {
    Account {
        data: counter_interface::CounterAccount { data: value, bump: 255 }
            .to_account_data()
            .unwrap(),
        ..account_owned_by(owner)
    }
}
