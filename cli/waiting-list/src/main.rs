#![cfg_attr(not(debug_assertions), deny(warnings))]

use anyhow::bail;
use cli_common::{logger, rpc_staking::StakingRpc, ss58};
use log::{debug, error, info};
use structopt::StructOpt;

pub mod effective_stake;
pub mod report;
pub mod team_multiplier;
pub mod waiting_list;

use waiting_list::WaitingListOptions;

#[derive(Debug, StructOpt)]
pub struct Common {
    #[structopt(
        long = "url",
        env = "WAITING_LIST_URL",
        help = "WebSocket URL of the chain node",
        default_value = "ws://localhost:63007"
    )]
    url: String,

    #[structopt(
        long = "ss58-prefix",
        help = "Address format of the identities shown",
        default_value = "55" // xx network
    )]
    ss58_prefix: u16,

    #[structopt(long = "log-level", default_value = "info")]
    log_level: log::LevelFilter,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "waiting-list",
    about = "Ranks the waiting validators by estimated effective stake"
)]
struct Params {
    #[structopt(flatten)]
    common: Common,

    #[structopt(flatten)]
    options: WaitingListOptions,
}

fn main() -> anyhow::Result<()> {
    let params = Params::from_args();

    logger::setup_with(params.common.log_level)?;
    debug!("{:?}", params);
    if params.common.ss58_prefix != ss58::XX_NETWORK_PREFIX {
        info!("Using ss58 prefix {}", params.common.ss58_prefix);
    }

    let rpc = match StakingRpc::connect(&params.common.url, params.common.ss58_prefix) {
        Ok(rpc) => rpc,
        Err(err) => {
            error!("Chain node {} not reachable: {:#}", params.common.url, err);
            bail!("Chain node {} not reachable: {:#}", params.common.url, err);
        }
    };

    let today = chrono::Local::now().date_naive();
    params.options.process(&rpc, today)
}
