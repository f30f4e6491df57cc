use crate::{
    effective_stake::WaitingListAggregator,
    report,
    team_multiplier::TeamMultiplierApi,
};
use chrono::NaiveDate;
use cli_common::{
    rpc_staking::{StakingRpc, StakingSnapshot},
    ExpandedPath,
};
use log::{info, warn};
use std::{collections::HashMap, path::PathBuf};
use structopt::StructOpt;

fn parse_switch(value: &str) -> Result<bool, std::convert::Infallible> {
    Ok(value == "true")
}

#[derive(Debug, StructOpt)]
pub struct WaitingListOptions {
    #[structopt(
        long = "tm-base-url",
        env = "TEAM_MULTIPLIER_URL",
        help = "Base URL of the daily team multiplier logs",
        default_value = "https://team-multiplier.xx.network/multiplier-logs/"
    )]
    tm_base_url: String,

    #[structopt(
        long = "no-team-multiplier",
        help = "Rank by nominator stake only, without fetching team multipliers"
    )]
    no_team_multiplier: bool,

    #[structopt(
        long = "write-waiting-list",
        env = "WRITE_WAITING_LIST",
        help = "\"true\" writes the ranked list to <output-dir>/<era>.json",
        parse(try_from_str = parse_switch),
        default_value = "false"
    )]
    write_waiting_list: bool,

    #[structopt(
        long = "output-dir",
        help = "Directory of the per-era waiting list files",
        default_value = "info_waiting_lists"
    )]
    output_dir: ExpandedPath,

    #[structopt(
        short = "v",
        long = "verbose",
        help = "Log every nominator taken into account per validator"
    )]
    verbose: bool,
}

impl WaitingListOptions {
    pub fn process(self, rpc: &StakingRpc, today: NaiveDate) -> anyhow::Result<()> {
        let snapshot = rpc.snapshot()?;
        let team_multipliers = self.load_team_multipliers(today);
        self.process_snapshot(snapshot, team_multipliers)?;
        Ok(())
    }

    /// Ranks the waiting validators of `snapshot`; returns the written file when exporting.
    pub fn process_snapshot(
        &self,
        snapshot: StakingSnapshot,
        team_multipliers: HashMap<String, f64>,
    ) -> anyhow::Result<Option<PathBuf>> {
        let era = snapshot.era;

        let mut aggregator = WaitingListAggregator::new(snapshot, self.verbose);
        if !team_multipliers.is_empty() {
            aggregator.attach_team_multipliers(&team_multipliers);
        }

        let ranked = report::rank(aggregator.estimate_waiting());
        report::log_ranking(era, &ranked);

        if !self.write_waiting_list {
            return Ok(None);
        }
        let records = report::to_records(&ranked, aggregator.nominators());
        let filename = report::save_waiting_list(era, &self.output_dir, &records)?;
        Ok(Some(filename))
    }

    fn load_team_multipliers(&self, today: NaiveDate) -> HashMap<String, f64> {
        if self.no_team_multiplier {
            info!("Team multipliers disabled");
            return HashMap::new();
        }
        match TeamMultiplierApi::new(&self.tm_base_url) {
            Ok(api) => api.current_values(today),
            Err(err) => {
                warn!("Team multipliers unavailable: {}", err);
                HashMap::new()
            }
        }
    }
}
