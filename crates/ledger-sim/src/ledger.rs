//! Simulated Ledger
//!
//! One in-memory ledger endpoint speaking the `LedgerClient` capability.
//! Submissions are decoded, signature-checked, checked against recent
//! blockhashes and executed by the counter processor one at a time; every
//! landed transaction advances the slot and rotates the blockhash.

use async_trait::async_trait;
use counter_interface::CounterProgram;
use dashmap::DashMap;
use er_client::{Ack, LedgerClient, LedgerError, LedgerKind, SubmitOptions};
use parking_lot::{Mutex, RwLock};
use solana_sdk::{
    account::Account, clock::Slot, commitment_config::CommitmentLevel, hash::Hash,
    pubkey::Pubkey, signature::Signature, transaction::Transaction,
};
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use crate::{
    account_store::AccountStore,
    processor::{CounterProcessor, PeerEffect},
};

/// Number of blockhashes a transaction may reference
pub const MAX_RECENT_BLOCKHASHES: usize = 150;

/// Interval at which `confirm` re-checks signature statuses
pub const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Injected misbehavior
#[derive(Debug, Clone, Default)]
struct Faults {
    /// Every read (`get_account`, `get_recency_token`) fails with this error
    fail_reads: Option<LedgerError>,
    /// Transactions land but `confirm` never resolves
    withhold_confirmations: bool,
    /// `submit` acknowledges but the transaction is lost in flight
    drop_submissions: bool,
    /// Transactions land but the `submit` response is lost
    lose_submit_responses: bool,
    /// Delay before commit/undelegate effects reach the base ledger
    settlement_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TxStatus {
    Landed(Slot),
    Failed { slot: Slot, reason: String },
}

/// An in-memory ledger
pub struct SimulatedLedger {
    kind: LedgerKind,
    endpoint: String,
    store: AccountStore,
    /// The other ledger's store, target of `PeerEffect`s
    peer: AccountStore,
    processor: CounterProcessor,
    slot: AtomicU64,
    recent_blockhashes: RwLock<VecDeque<Hash>>,
    statuses: DashMap<Signature, TxStatus>,
    faults: RwLock<Faults>,
    /// Serializes execution so each transaction sees the previous one's writes
    execution: Mutex<()>,
    submissions: AtomicUsize,
}

impl SimulatedLedger {
    pub fn new(
        kind: LedgerKind,
        program: CounterProgram,
        store: AccountStore,
        peer: AccountStore,
    ) -> Self {
        let mut recent = VecDeque::with_capacity(MAX_RECENT_BLOCKHASHES);
        recent.push_back(Hash::new_unique());

        Self {
            kind,
            endpoint: format!("sim://{}", kind),
            store,
            peer,
            processor: CounterProcessor::new(program, kind),
            slot: AtomicU64::new(0),
            recent_blockhashes: RwLock::new(recent),
            statuses: DashMap::new(),
            faults: RwLock::new(Faults::default()),
            execution: Mutex::new(()),
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    /// Direct read, bypassing injected faults
    pub fn account(&self, address: &Pubkey) -> Option<Account> {
        self.store.get_account(address)
    }

    /// Number of `submit` calls received, whatever their outcome
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, error: Option<LedgerError>) {
        self.faults.write().fail_reads = error;
    }

    pub fn withhold_confirmations(&self, withhold: bool) {
        self.faults.write().withhold_confirmations = withhold;
    }

    pub fn drop_submissions(&self, drop: bool) {
        self.faults.write().drop_submissions = drop;
    }

    pub fn lose_submit_responses(&self, lose: bool) {
        self.faults.write().lose_submit_responses = lose;
    }

    pub fn set_settlement_delay(&self, delay: Duration) {
        self.faults.write().settlement_delay = delay;
    }

    fn check_reads(&self) -> Result<(), LedgerError> {
        match &self.faults.read().fail_reads {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn latest_blockhash(&self) -> Hash {
        self.recent_blockhashes
            .read()
            .back()
            .copied()
            .unwrap_or_default()
    }

    fn is_recent(&self, blockhash: &Hash) -> bool {
        self.recent_blockhashes.read().contains(blockhash)
    }

    /// Advance to the next slot with a fresh blockhash
    fn advance_slot(&self) -> Slot {
        let slot = self.slot.fetch_add(1, Ordering::SeqCst) + 1;
        let mut recent = self.recent_blockhashes.write();
        recent.push_back(Hash::new_unique());
        while recent.len() > MAX_RECENT_BLOCKHASHES {
            recent.pop_front();
        }
        slot
    }

    /// Execute `tx` and write its results; returns the slot it landed in
    fn execute(&self, tx: &Transaction, signature: Signature) -> Result<Slot, String> {
        let _execution = self.execution.lock();

        let output = match self.processor.process_transaction(tx, &self.store) {
            Ok(output) => output,
            Err(e) => {
                self.statuses.insert(
                    signature,
                    TxStatus::Failed {
                        slot: self.slot.load(Ordering::SeqCst),
                        reason: e.to_string(),
                    },
                );
                return Err(e.to_string());
            }
        };

        let slot = self.advance_slot();
        for (key, account) in output.writes {
            match account {
                Some(account) => self.store.store_account(key, account),
                None => {
                    self.store.remove_account(&key);
                }
            }
        }
        for line in &output.logs {
            tracing::trace!("[{}] {}", self.kind, line);
        }
        for effect in output.effects {
            self.dispatch(effect);
        }

        self.statuses.insert(signature, TxStatus::Landed(slot));
        Ok(slot)
    }

    fn dispatch(&self, effect: PeerEffect) {
        let delay = match effect {
            PeerEffect::Clone { .. } => Duration::ZERO,
            PeerEffect::Checkpoint { .. } | PeerEffect::Release { .. } => {
                self.faults.read().settlement_delay
            }
        };

        if delay.is_zero() {
            effect.apply(&self.peer);
            return;
        }

        tracing::debug!("Settling {} on the peer ledger in {:?}", effect.address(), delay);
        let peer = self.peer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            effect.apply(&peer);
        });
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        self.check_reads()?;
        Ok(self.store.get_account(address))
    }

    async fn get_recency_token(&self) -> Result<Hash, LedgerError> {
        self.check_reads()?;
        Ok(self.latest_blockhash())
    }

    async fn submit(
        &self,
        signed_tx: &[u8],
        opts: SubmitOptions,
    ) -> Result<Signature, LedgerError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);

        let tx: Transaction = bincode::deserialize(signed_tx)
            .map_err(|e| {
                LedgerError::Rejected(format!("failed to deserialize transaction: {}", e))
            })?;
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| LedgerError::Rejected("transaction has no signatures".into()))?;

        if self.faults.read().drop_submissions {
            tracing::debug!("[{}] dropping {}", self.kind, signature);
            return Ok(signature);
        }

        if tx.verify().is_err() {
            return Err(LedgerError::Rejected(
                "Transaction signature verification failure".into(),
            ));
        }
        if !self.is_recent(&tx.message.recent_blockhash) {
            return Err(LedgerError::Rejected("Blockhash not found".into()));
        }
        if self.statuses.contains_key(&signature) {
            return Err(LedgerError::Rejected("This transaction has already been processed".into()));
        }

        match self.execute(&tx, signature) {
            Ok(slot) if self.faults.read().lose_submit_responses => {
                tracing::debug!(
                    "[{}] {} landed in slot {}; losing the response",
                    self.kind,
                    signature,
                    slot
                );
                Err(LedgerError::Transport("connection reset by peer".into()))
            }
            Ok(slot) => {
                tracing::debug!("[{}] {} landed in slot {}", self.kind, signature, slot);
                Ok(signature)
            }
            Err(reason) if opts.skip_preflight => {
                tracing::debug!("[{}] {} failed: {}", self.kind, signature, reason);
                Ok(signature)
            }
            Err(reason) => {
                // Preflight failures leave no trace on the ledger
                self.statuses.remove(&signature);
                Err(LedgerError::Rejected(format!("Transaction simulation failed: {}", reason)))
            }
        }
    }

    async fn confirm(
        &self,
        signature: &Signature,
        _commitment: CommitmentLevel,
    ) -> Result<Ack, LedgerError> {
        loop {
            if !self.faults.read().withhold_confirmations {
                let status = self.statuses.get(signature).map(|s| s.value().clone());
                match status {
                    Some(TxStatus::Landed(slot)) => {
                        return Ok(Ack {
                            signature: *signature,
                            slot,
                        })
                    }
                    Some(TxStatus::Failed { slot, reason }) => {
                        return Err(LedgerError::Rejected(format!("{} (slot {})", reason, slot)))
                    }
                    None => {}
                }
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counter_interface::{constants::PDA_SEED, derive_counter_pda};
    use solana_sdk::{
        message::Message,
        signature::{Keypair, Signer},
    };

    fn ledger() -> SimulatedLedger {
        SimulatedLedger::new(
            LedgerKind::Base,
            CounterProgram::default(),
            AccountStore::new(),
            AccountStore::new(),
        )
    }

    fn initialize_tx(payer: &Keypair, blockhash: Hash) -> Vec<u8> {
        let program = CounterProgram::default();
        let counter = derive_counter_pda(PDA_SEED, &program.program_id).0;
        let ix = program.initialize(counter, payer.pubkey());
        let message = Message::new(&[ix], Some(&payer.pubkey()));
        bincode::serialize(&Transaction::new(&[payer], message, blockhash)).unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_confirm() {
        let ledger = ledger();
        let payer = Keypair::new();
        let blockhash = ledger.get_recency_token().await.unwrap();

        let signature = ledger
            .submit(&initialize_tx(&payer, blockhash), SubmitOptions::default())
            .await
            .unwrap();
        let ack = ledger.confirm(&signature, CommitmentLevel::Confirmed).await.unwrap();
        assert_eq!(ack.slot, 1);
        assert_ne!(ledger.get_recency_token().await.unwrap(), blockhash);
        assert_eq!(ledger.store().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_blockhash_rejected() {
        let ledger = ledger();
        let err = ledger
            .submit(&initialize_tx(&Keypair::new(), Hash::new_unique()), SubmitOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Rejected("Blockhash not found".into()));
        assert_eq!(ledger.submissions(), 1);
        assert!(ledger.store().is_empty());
    }

    #[tokio::test]
    async fn test_failed_execution_with_and_without_preflight() {
        let ledger = ledger();
        let blockhash = ledger.get_recency_token().await.unwrap();
        let first = Keypair::new();
        ledger
            .submit(&initialize_tx(&first, blockhash), SubmitOptions::default())
            .await
            .unwrap();

        // Second initialize fails in preflight
        let err = ledger
            .submit(&initialize_tx(&Keypair::new(), blockhash), SubmitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(ref r) if r.contains("already initialized")));

        // Without preflight it is accepted and fails at confirmation
        let signature = ledger
            .submit(
                &initialize_tx(&Keypair::new(), blockhash),
                SubmitOptions { skip_preflight: true },
            )
            .await
            .unwrap();
        let err = ledger.confirm(&signature, CommitmentLevel::Confirmed).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unsigned_transaction_rejected() {
        let ledger = ledger();
        let program = CounterProgram::default();
        let payer = Keypair::new();
        let message = Message::new_with_blockhash(
            &[program.increment(Pubkey::new_unique())],
            Some(&payer.pubkey()),
            &ledger.get_recency_token().await.unwrap(),
        );
        let wire = bincode::serialize(&Transaction::new_unsigned(message)).unwrap();

        let err = ledger.submit(&wire, SubmitOptions::default()).await.unwrap_err();
        assert!(
            matches!(err, LedgerError::Rejected(ref r) if r.contains("signature verification"))
        );
    }

    #[tokio::test]
    async fn test_lost_submit_response_still_lands() {
        let ledger = ledger();
        let payer = Keypair::new();
        let blockhash = ledger.get_recency_token().await.unwrap();
        ledger.lose_submit_responses(true);

        let wire = initialize_tx(&payer, blockhash);
        let err = ledger.submit(&wire, SubmitOptions::default()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)));
        assert_eq!(ledger.store().len(), 1);

        // The landed signature is known to the ledger
        let tx: Transaction = bincode::deserialize(&wire).unwrap();
        let ack = ledger.confirm(&tx.signatures[0], CommitmentLevel::Confirmed).await.unwrap();
        assert_eq!(ack.slot, 1);
    }

    #[tokio::test]
    async fn test_read_faults() {
        let ledger = ledger();
        ledger.fail_reads(Some(LedgerError::Transport("connection reset".into())));
        assert!(ledger.get_account(&Pubkey::new_unique()).await.is_err());
        assert!(ledger.get_recency_token().await.is_err());

        ledger.fail_reads(None);
        assert_eq!(ledger.get_account(&Pubkey::new_unique()).await.unwrap(), None);
    }
}
