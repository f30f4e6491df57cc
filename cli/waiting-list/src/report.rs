use {
    crate::effective_stake::{Nominator, Validator},
    log::*,
    serde::Serialize,
    std::{
        collections::HashMap,
        fs::{self, File},
        io::Write,
        path::{Path, PathBuf},
    },
};

const INTRO: &str = "
    Below the validators from the Waiting list are shown ordered by 'effective stake'.
    The effective stake is calculated by summing the bonded amounts of the nominators divided
    by the number of validators they nominate (including the self-stake).
    The validators on top of the list are most likely to enter the Active list the next era
    (if you run this just before the election cutoff).
";

#[derive(Debug, Serialize)]
pub struct NominatorRecord {
    pub identity: String,
    pub bonded: f64,
    pub targets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WaitingValidatorRecord {
    pub rank: usize,
    pub identity: String,
    pub total_stake: f64,
    pub effective_stake: f64,
    pub self_stake: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_multiplier: Option<f64>,
    pub nominators: Vec<NominatorRecord>,
}

/// Orders by effective stake, highest first; equal stakes by identity.
pub fn rank(mut validators: Vec<Validator>) -> Vec<Validator> {
    validators.sort_by(|a, b| {
        b.effective_stake
            .total_cmp(&a.effective_stake)
            .then_with(|| a.identity.cmp(&b.identity))
    });
    validators
}

pub fn format_line(rank: usize, validator: &Validator) -> String {
    let mut line = format!(
        "{:3} Validator: {}, effective stake {:8.0}, self_stake {:8.0}, {:3} nominators",
        rank,
        validator.identity,
        validator.effective_stake,
        validator.self_stake,
        validator.nominators.len()
    );
    if let Some(team_multiplier) = validator.team_multiplier {
        line.push_str(&format!(", team multiplier {:8.0}", team_multiplier));
    }
    line
}

pub fn log_ranking(era: u32, ranked: &[Validator]) {
    info!("{}", INTRO);
    info!("Waiting list for era {}: {} validators", era, ranked.len());
    for (index, validator) in ranked.iter().enumerate() {
        info!("{}", format_line(index + 1, validator));
    }
    info!(" ");
}

pub fn to_records(
    ranked: &[Validator],
    nominators: &HashMap<String, Nominator>,
) -> Vec<WaitingValidatorRecord> {
    ranked
        .iter()
        .enumerate()
        .map(|(index, validator)| WaitingValidatorRecord {
            rank: index + 1,
            identity: validator.identity.clone(),
            total_stake: validator.total_stake,
            effective_stake: validator.effective_stake,
            self_stake: validator.self_stake,
            team_multiplier: validator.team_multiplier,
            nominators: validator
                .nominators
                .iter()
                .map(|identity| match nominators.get(identity) {
                    Some(nominator) => NominatorRecord {
                        identity: identity.clone(),
                        bonded: nominator.bonded,
                        targets: nominator.targets.clone(),
                    },
                    None => NominatorRecord {
                        identity: identity.clone(),
                        bonded: 0.0,
                        targets: vec![],
                    },
                })
                .collect(),
        })
        .collect()
}

pub fn file_name<P>(era: u32, path: P) -> PathBuf
where
    P: AsRef<Path>,
{
    path.as_ref().join(format!("{}.json", era))
}

/// Writes `<path>/<era>.json`, creating `path` when needed.
pub fn save_waiting_list<P>(
    era: u32,
    path: P,
    records: &[WaitingValidatorRecord],
) -> anyhow::Result<PathBuf>
where
    P: AsRef<Path>,
{
    let serialized = serde_json::to_string_pretty(records)?;

    fs::create_dir_all(&path)?;
    let filename = file_name(era, path);
    info!("Writing {}", filename.display());
    let mut file = File::create(&filename)?;
    file.write_all(&serialized.into_bytes())?;

    Ok(filename)
}
