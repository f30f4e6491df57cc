use cli_common::rpc_staking::StakingSnapshot;
use log::*;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Fixed-point units per token in ledger balances.
pub const UNITS_PER_TOKEN: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Nominator {
    pub identity: String,
    pub targets: Vec<String>,
    /// bonded tokens, 0 until a ledger entry is found for the stash
    pub bonded: f64,
}

impl Nominator {
    fn new(identity: String, targets: Vec<String>) -> Self {
        Self {
            identity,
            targets,
            bonded: 0.0,
        }
    }

    /// Number of validators the bonded stake is split across, never 0.
    pub fn fan_out(&self) -> usize {
        self.targets.len().max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    pub identity: String,
    /// identities into the aggregator's nominator map, always including the validator itself
    pub nominators: BTreeSet<String>,
    pub total_stake: f64,
    pub effective_stake: f64,
    pub self_stake: f64,
    pub team_multiplier: Option<f64>,
}

impl Validator {
    fn new(identity: String) -> Self {
        let mut nominators = BTreeSet::new();
        nominators.insert(identity.clone());
        Self {
            identity,
            nominators,
            total_stake: 0.0,
            effective_stake: 0.0,
            self_stake: 0.0,
            team_multiplier: None,
        }
    }

    fn add_nominator(&mut self, nominator: &str) {
        self.nominators.insert(nominator.to_string());
    }

    fn estimate_effective_stake(
        &mut self,
        all_nominators: &HashMap<String, Nominator>,
        verbose: bool,
    ) {
        let level = if verbose { Level::Info } else { Level::Debug };
        log!(
            level,
            "Validator: {} - {} nominators",
            self.identity,
            self.nominators.len()
        );

        self.total_stake = 0.0;
        self.effective_stake = self.team_multiplier.unwrap_or(0.0);
        self.self_stake = 0.0;

        for nominator_identity in &self.nominators {
            let nominator = match all_nominators.get(nominator_identity) {
                Some(nominator) => nominator,
                None => {
                    log!(level, "    Nominator: {} - unknown, no stake", nominator_identity);
                    continue;
                }
            };
            let bonded = nominator.bonded;
            let fan_out = nominator.fan_out();
            log!(
                level,
                "    Nominator: {} - bonded {:8.0} - {:3} validators",
                nominator_identity,
                bonded,
                fan_out
            );

            self.total_stake += bonded;
            self.effective_stake += bonded / fan_out as f64;
            if *nominator_identity == self.identity {
                self.self_stake = bonded;
            }
        }
    }
}

/// Index of nominators and validators built from one staking snapshot.
pub struct WaitingListAggregator {
    nominators: HashMap<String, Nominator>,
    validators: HashMap<String, Validator>,
    waiting: HashSet<String>,
    verbose: bool,
}

impl WaitingListAggregator {
    pub fn new(snapshot: StakingSnapshot, verbose: bool) -> Self {
        let StakingSnapshot {
            era: _,
            nominators: nominations,
            validators: validator_identities,
            active_validators,
            ledger,
        } = snapshot;

        let mut nominators: HashMap<String, Nominator> = nominations
            .into_iter()
            .map(|(identity, targets)| (identity.clone(), Nominator::new(identity, targets)))
            .collect();

        // validators back themselves with their own bond
        for validator in &validator_identities {
            nominators
                .entry(validator.clone())
                .or_insert_with(|| Nominator::new(validator.clone(), vec![validator.clone()]));
        }

        let mut validators: HashMap<String, Validator> = validator_identities
            .iter()
            .map(|identity| (identity.clone(), Validator::new(identity.clone())))
            .collect();
        for nominator in nominators.values() {
            for target in &nominator.targets {
                validators
                    .entry(target.clone())
                    .or_insert_with(|| Validator::new(target.clone()))
                    .add_nominator(&nominator.identity);
            }
        }

        let mut unknown_stashes = 0;
        for entry in ledger {
            match nominators.get_mut(&entry.stash) {
                Some(nominator) => nominator.bonded = entry.active as f64 / UNITS_PER_TOKEN,
                None => unknown_stashes += 1,
            }
        }
        debug!("{} ledger entries without a nominator skipped", unknown_stashes);

        let waiting: HashSet<String> = validator_identities
            .difference(&active_validators)
            .cloned()
            .collect();
        info!(
            "{} validators, {} active, {} waiting",
            validator_identities.len(),
            validator_identities.len() - waiting.len(),
            waiting.len()
        );

        Self {
            nominators,
            validators,
            waiting,
            verbose,
        }
    }

    /// Sets the team multiplier of every known validator listed in `values`.
    /// Returns how many validators received a value.
    pub fn attach_team_multipliers(&mut self, values: &HashMap<String, f64>) -> usize {
        let mut attached = 0;
        for (identity, value) in values {
            if let Some(validator) = self.validators.get_mut(identity) {
                validator.team_multiplier = Some(*value);
                attached += 1;
            } else {
                trace!("Team multiplier for unknown validator {}", identity);
            }
        }
        info!("Team multipliers attached to {} validators", attached);
        attached
    }

    /// Computes stake figures for every waiting validator, unordered.
    pub fn estimate_waiting(&mut self) -> Vec<Validator> {
        let mut estimated = Vec::with_capacity(self.waiting.len());
        for identity in &self.waiting {
            if let Some(validator) = self.validators.get_mut(identity) {
                validator.estimate_effective_stake(&self.nominators, self.verbose);
                estimated.push(validator.clone());
            }
        }
        estimated
    }

    pub fn nominators(&self) -> &HashMap<String, Nominator> {
        &self.nominators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cli_common::rpc_staking::LedgerEntry;

    fn tokens(amount: u64) -> u128 {
        amount as u128 * 1_000_000_000
    }

    fn snapshot(
        nominations: &[(&str, &[&str])],
        validators: &[&str],
        active: &[&str],
        bonds: &[(&str, u64)],
    ) -> StakingSnapshot {
        StakingSnapshot {
            era: 7,
            nominators: nominations
                .iter()
                .map(|(identity, targets)| {
                    (
                        identity.to_string(),
                        targets.iter().map(|t| t.to_string()).collect(),
                    )
                })
                .collect(),
            validators: validators.iter().map(|v| v.to_string()).collect(),
            active_validators: active.iter().map(|v| v.to_string()).collect(),
            ledger: bonds
                .iter()
                .map(|(stash, amount)| LedgerEntry {
                    stash: stash.to_string(),
                    active: tokens(*amount),
                })
                .collect(),
        }
    }

    fn estimated(aggregator: &mut WaitingListAggregator, identity: &str) -> Validator {
        aggregator
            .estimate_waiting()
            .into_iter()
            .find(|v| v.identity == identity)
            .unwrap()
    }

    #[test]
    fn nominator_and_self_stake_add_up() {
        let mut aggregator = WaitingListAggregator::new(
            snapshot(&[("A", &["V1"])], &["V1"], &[], &[("A", 100), ("V1", 50)]),
            false,
        );
        let v1 = estimated(&mut aggregator, "V1");
        assert_eq!(v1.effective_stake, 150.0);
        assert_eq!(v1.total_stake, 150.0);
        assert_eq!(v1.self_stake, 50.0);
        assert_eq!(v1.nominators.len(), 2);
    }

    #[test]
    fn stake_is_split_across_targets() {
        let mut aggregator = WaitingListAggregator::new(
            snapshot(&[("B", &["V1", "V2"])], &["V1", "V2"], &[], &[("B", 60)]),
            false,
        );
        let waiting = aggregator.estimate_waiting();
        assert_eq!(waiting.len(), 2);
        for validator in waiting {
            assert_eq!(validator.effective_stake, 30.0);
            assert_eq!(validator.total_stake, 60.0);
            assert_eq!(validator.self_stake, 0.0);
        }
    }

    #[test]
    fn team_multiplier_seeds_effective_stake() {
        let mut aggregator = WaitingListAggregator::new(
            snapshot(&[("A", &["V1"])], &["V1"], &[], &[("A", 100), ("V1", 50)]),
            false,
        );
        let mut values = HashMap::new();
        values.insert("V1".to_string(), 500.0);
        values.insert("NOT-A-VALIDATOR".to_string(), 9.0);
        assert_eq!(aggregator.attach_team_multipliers(&values), 1);

        let v1 = estimated(&mut aggregator, "V1");
        assert_eq!(v1.team_multiplier, Some(500.0));
        assert_eq!(v1.effective_stake, 650.0);
        assert_eq!(v1.total_stake, 150.0);
    }

    #[test]
    fn unknown_ledger_stash_is_ignored() {
        let mut aggregator = WaitingListAggregator::new(
            snapshot(
                &[("A", &["V1"])],
                &["V1"],
                &[],
                &[("A", 100), ("V1", 50), ("GHOST", 1_000_000)],
            ),
            false,
        );
        assert!(aggregator.nominators().get("GHOST").is_none());
        let v1 = estimated(&mut aggregator, "V1");
        assert_eq!(v1.effective_stake, 150.0);
        assert_eq!(v1.total_stake, 150.0);
    }

    #[test]
    fn missing_bond_counts_as_zero() {
        let mut aggregator =
            WaitingListAggregator::new(snapshot(&[("A", &["V1"])], &["V1"], &[], &[]), false);
        assert_eq!(aggregator.nominators()["A"].bonded, 0.0);
        let v1 = estimated(&mut aggregator, "V1");
        assert_eq!(v1.effective_stake, 0.0);
        assert_eq!(v1.total_stake, 0.0);
    }

    #[test]
    fn every_validator_nominates_itself() {
        let aggregator = WaitingListAggregator::new(
            snapshot(
                // V2 backs V1 but not itself
                &[("A", &["V1", "V3"]), ("V2", &["V1"])],
                &["V1", "V2", "V3"],
                &["V3"],
                &[],
            ),
            false,
        );
        for identity in ["V1", "V2", "V3"] {
            let validator = aggregator.validators.get(identity).unwrap();
            assert!(validator.nominators.contains(identity));
            assert!(aggregator.nominators().contains_key(identity));
        }
        assert_eq!(aggregator.nominators()["V1"].targets, vec!["V1".to_string()]);
        assert_eq!(aggregator.nominators()["V2"].targets, vec!["V1".to_string()]);
    }

    #[test]
    fn fan_out_is_never_zero() {
        let aggregator = WaitingListAggregator::new(
            snapshot(&[("EMPTY", &[]), ("A", &["V1"])], &["V1"], &[], &[("EMPTY", 10)]),
            false,
        );
        for nominator in aggregator.nominators().values() {
            assert!(nominator.fan_out() >= 1);
        }
        assert_eq!(aggregator.nominators()["EMPTY"].fan_out(), 1);
    }

    #[test]
    fn waiting_excludes_active_validators() {
        let mut aggregator = WaitingListAggregator::new(
            snapshot(&[("A", &["V1", "V2"])], &["V1", "V2", "V3"], &["V2"], &[]),
            false,
        );
        assert!(aggregator.waiting.contains("V1"));
        assert!(!aggregator.waiting.contains("V2"));
        assert!(aggregator.waiting.contains("V3"));

        let mut identities: Vec<String> = aggregator
            .estimate_waiting()
            .into_iter()
            .map(|v| v.identity)
            .collect();
        identities.sort();
        assert_eq!(identities, vec!["V1".to_string(), "V3".to_string()]);
    }

    #[test]
    fn adding_a_nominator_twice_is_a_no_op() {
        let mut validator = Validator::new("V1".to_string());
        validator.add_nominator("A");
        validator.add_nominator("A");
        validator.add_nominator("V1");
        let nominators: Vec<&str> = validator.nominators.iter().map(|n| n.as_str()).collect();
        assert_eq!(nominators, vec!["A", "V1"]);
    }

    #[test]
    fn duplicate_targets_register_once() {
        let aggregator = WaitingListAggregator::new(
            snapshot(&[("A", &["V1", "V1"])], &["V1"], &[], &[("A", 10)]),
            false,
        );
        assert_eq!(aggregator.validators.get("V1").unwrap().nominators.len(), 2);
    }

    #[test]
    fn estimate_is_repeatable_and_order_independent() {
        let bonds = [("A", 7), ("B", 11), ("C", 13), ("V1", 3), ("V2", 5)];
        let nominations: [(&str, &[&str]); 3] = [
            ("A", &["V1", "V2"]),
            ("B", &["V1", "V2"]),
            ("C", &["V1"]),
        ];
        let mut reversed_bonds = bonds;
        reversed_bonds.reverse();
        let mut reversed_nominations = nominations;
        reversed_nominations.reverse();

        let mut first =
            WaitingListAggregator::new(snapshot(&nominations, &["V1", "V2"], &[], &bonds), true);
        let mut second = WaitingListAggregator::new(
            snapshot(&reversed_nominations, &["V2", "V1"], &[], &reversed_bonds),
            false,
        );

        let once = estimated(&mut first, "V1");
        let twice = estimated(&mut first, "V1");
        assert_eq!(once, twice);
        assert_eq!(once, estimated(&mut second, "V1"));
        assert_eq!(once.effective_stake, 3.0 + 3.5 + 5.5 + 13.0);
    }
}
