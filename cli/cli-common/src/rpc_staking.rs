use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context};
use codec::Decode;
use futures::TryStreamExt;
use log::{debug, info, warn};
use subxt::{storage::Storage, OnlineClient, PolkadotConfig};
use thiserror::Error;
use tokio::runtime::Runtime;

use crate::ss58;

pub type AccountBytes = [u8; 32];

type ChainStorage = Storage<PolkadotConfig, OnlineClient<PolkadotConfig>>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("storage key of {len} bytes is too short to hold an account id")]
    ShortKey { len: usize },
    #[error("cannot decode {entry} value: {source}")]
    Decode {
        entry: &'static str,
        #[source]
        source: codec::Error,
    },
}

/// Bonded balance of one stash as recorded in `Staking.Ledger`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub stash: String,
    /// fixed-point amount, 10^9 units per token
    pub active: u128,
}

/// Point-in-time view of the staking pallet, identities in SS58 form.
#[derive(Debug, Default, Clone)]
pub struct StakingSnapshot {
    pub era: u32,
    /// nominator identity -> nominated validator identities
    pub nominators: HashMap<String, Vec<String>>,
    pub validators: HashSet<String>,
    pub active_validators: HashSet<String>,
    pub ledger: Vec<LedgerEntry>,
}

// Only the leading fields are decoded; runtimes append their own fields after these.
#[derive(Decode)]
struct NominationsPrefix {
    targets: Vec<AccountBytes>,
}

#[derive(Decode)]
struct StakingLedgerPrefix {
    stash: AccountBytes,
    #[codec(compact)]
    _total: u128,
    #[codec(compact)]
    active: u128,
}

#[derive(Decode)]
struct ActiveEraPrefix {
    index: u32,
}

/// Blocking access to the staking state of a node.
pub struct StakingRpc {
    runtime: Runtime,
    client: OnlineClient<PolkadotConfig>,
    ss58_prefix: u16,
}

impl StakingRpc {
    pub fn connect(url: &str, ss58_prefix: u16) -> anyhow::Result<Self> {
        if !ss58::is_valid_prefix(ss58_prefix) {
            bail!(
                "ss58 prefix {} is above the maximum {}",
                ss58_prefix,
                ss58::MAX_PREFIX
            );
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let client = runtime
            .block_on(OnlineClient::<PolkadotConfig>::from_url(url))
            .with_context(|| format!("cannot connect to {}", url))?;
        info!("Connected to {}", url);
        Ok(Self {
            runtime,
            client,
            ss58_prefix,
        })
    }

    pub fn snapshot(&self) -> anyhow::Result<StakingSnapshot> {
        self.runtime.block_on(self.fetch_snapshot())
    }

    async fn fetch_snapshot(&self) -> anyhow::Result<StakingSnapshot> {
        let storage = self.client.storage().at_latest().await?;

        let era = match fetch_value(&storage, "Staking", "ActiveEra").await? {
            Some(value) => decode_active_era(&value)?,
            None => {
                warn!("Staking.ActiveEra is empty, using era 0");
                0
            }
        };

        let mut nominators = HashMap::new();
        for (key, value) in iter_entries(&storage, "Staking", "Nominators").await? {
            match account_from_key(&key).and_then(|nominator| {
                decode_targets(&value).map(|targets| (nominator, targets))
            }) {
                Ok((nominator, targets)) => {
                    nominators.insert(
                        self.identity(&nominator),
                        targets.iter().map(|target| self.identity(target)).collect(),
                    );
                }
                Err(err) => warn!("Skipping Staking.Nominators entry: {}", err),
            }
        }

        let mut validators = HashSet::new();
        for (key, _) in iter_entries(&storage, "Staking", "Validators").await? {
            match account_from_key(&key) {
                Ok(validator) => {
                    validators.insert(self.identity(&validator));
                }
                Err(err) => warn!("Skipping Staking.Validators entry: {}", err),
            }
        }

        let active_validators = match fetch_value(&storage, "Session", "Validators").await? {
            Some(value) => decode_accounts(&value)?
                .iter()
                .map(|account| self.identity(account))
                .collect(),
            None => HashSet::new(),
        };

        let mut ledger = Vec::new();
        for (_, value) in iter_entries(&storage, "Staking", "Ledger").await? {
            match decode_ledger(&value) {
                Ok((stash, active)) => ledger.push(LedgerEntry {
                    stash: self.identity(&stash),
                    active,
                }),
                Err(err) => warn!("Skipping Staking.Ledger entry: {}", err),
            }
        }

        info!(
            "Era {}: {} nominators, {} validators, {} active, {} ledger entries",
            era,
            nominators.len(),
            validators.len(),
            active_validators.len(),
            ledger.len()
        );

        Ok(StakingSnapshot {
            era,
            nominators,
            validators,
            active_validators,
            ledger,
        })
    }

    fn identity(&self, account: &AccountBytes) -> String {
        ss58::encode(account, self.ss58_prefix)
    }
}

async fn iter_entries(
    storage: &ChainStorage,
    pallet: &str,
    entry: &str,
) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut entries = Vec::new();
    let mut results = storage
        .iter(subxt::dynamic::storage(pallet, entry, ()))
        .await
        .with_context(|| format!("cannot iterate {}.{}", pallet, entry))?;
    while let Some(kv) = results.try_next().await? {
        entries.push((kv.key_bytes, kv.value.encoded().to_vec()));
    }
    debug!("{}.{}: {} entries", pallet, entry, entries.len());
    Ok(entries)
}

async fn fetch_value(
    storage: &ChainStorage,
    pallet: &str,
    entry: &str,
) -> anyhow::Result<Option<Vec<u8>>> {
    Ok(storage
        .fetch(&subxt::dynamic::storage(pallet, entry, ()))
        .await
        .with_context(|| format!("cannot fetch {}.{}", pallet, entry))?
        .map(|value| value.encoded().to_vec()))
}

/// Account id of a `Twox64Concat` or `Blake2_128Concat` keyed map entry: the last 32 bytes.
pub fn account_from_key(key: &[u8]) -> Result<AccountBytes, SnapshotError> {
    if key.len() < 32 {
        return Err(SnapshotError::ShortKey { len: key.len() });
    }
    let mut account = [0u8; 32];
    account.copy_from_slice(&key[key.len() - 32..]);
    Ok(account)
}

pub fn decode_targets(value: &[u8]) -> Result<Vec<AccountBytes>, SnapshotError> {
    NominationsPrefix::decode(&mut &value[..])
        .map(|nominations| nominations.targets)
        .map_err(|source| SnapshotError::Decode {
            entry: "Staking.Nominators",
            source,
        })
}

pub fn decode_ledger(value: &[u8]) -> Result<(AccountBytes, u128), SnapshotError> {
    StakingLedgerPrefix::decode(&mut &value[..])
        .map(|ledger| (ledger.stash, ledger.active))
        .map_err(|source| SnapshotError::Decode {
            entry: "Staking.Ledger",
            source,
        })
}

pub fn decode_accounts(value: &[u8]) -> Result<Vec<AccountBytes>, SnapshotError> {
    Vec::<AccountBytes>::decode(&mut &value[..]).map_err(|source| SnapshotError::Decode {
        entry: "Session.Validators",
        source,
    })
}

pub fn decode_active_era(value: &[u8]) -> Result<u32, SnapshotError> {
    ActiveEraPrefix::decode(&mut &value[..])
        .map(|era| era.index)
        .map_err(|source| SnapshotError::Decode {
            entry: "Staking.ActiveEra",
            source,
        })
}
