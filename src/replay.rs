use log::{debug, info, warn};

use estimation_voting::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use estimation_voting::builder::ParticipantBuilder;
use estimation_voting::estimate::Estimate;
use estimation_voting::session::Participant;
use estimation_voting::store::MemoryStore;
use estimation_voting::store::ReplicatedStore;

use crate::replay::script_reader::*;

#[derive(Debug, Snafu)]
pub enum ReplayError {
    #[snafu(display("Error opening session file {path}"))]
    OpeningSession {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display(""))]
    ParsingJsonNumber {},
    #[snafu(display("Error opening spreadsheet {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display(""))]
    EmptyExcel {},
    #[snafu(display(""))]
    MissingParentDir {},
    #[snafu(display("Unknown participant {name} in script step {step}"))]
    UnknownParticipant { name: String, step: usize },
    #[snafu(display("Error writing the summary file"))]
    WritingSummary { source: std::io::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

type ReplayResult<T> = Result<T, ReplayError>;

pub mod script_reader {
    use crate::replay::*;

    /// On-disk description of a recorded session.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct SessionFile {
        #[serde(rename = "sessionName")]
        pub session_name: String,
        pub rules: Option<ScriptRules>,
        pub participants: Vec<ScriptParticipant>,
        #[serde(rename = "itemFileSources")]
        pub item_file_sources: Option<Vec<ItemFileSource>>,
        pub script: Vec<ScriptStep>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ScriptRules {
        #[serde(rename = "dotsPerVoter")]
        pub dots_per_voter: Option<u32>,
        #[serde(rename = "randomSeed")]
        pub random_seed: Option<String>,
        /// false turns the session into a plain dot-voting round.
        pub estimation: Option<bool>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ScriptParticipant {
        pub name: String,
        pub admin: Option<bool>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ItemFileSource {
        pub provider: String,
        #[serde(rename = "filePath")]
        pub file_path: String,
        /// The participant credited with the imported items.
        pub contributor: String,
        #[serde(rename = "itemColumnIndex")]
        _item_column_index: Option<JSValue>,
        #[serde(rename = "firstItemRowIndex")]
        pub first_item_row_index: Option<JSValue>,
    }

    impl ItemFileSource {
        pub fn item_column_index(&self) -> ReplayResult<usize> {
            let x = read_js_int(&self._item_column_index, 1)?;
            Ok(x - 1)
        }

        pub fn first_item_row(&self) -> ReplayResult<usize> {
            read_js_int(&self.first_item_row_index, 1)
        }
    }

    /// One recorded action. The `action` field selects which of the other
    /// fields are required.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ScriptStep {
        pub action: String,
        pub participant: String,
        pub text: Option<String>,
        pub selection: Option<Vec<String>>,
        pub value: Option<String>,
        pub state: Option<String>,
    }

    pub fn read_session_file(path: &str) -> ReplayResult<SessionFile> {
        let contents = fs::read_to_string(path).context(OpeningSessionSnafu { path })?;
        debug!("read content: {:?}", contents);
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})
    }

    pub fn read_summary(path: String) -> ReplayResult<JSValue> {
        let contents = fs::read_to_string(path.clone()).context(OpeningSessionSnafu { path })?;
        debug!("read content: {:?}", contents);
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(js)
    }

    fn read_js_int(x: &Option<JSValue>, default: usize) -> ReplayResult<usize> {
        match x {
            Some(JSValue::Number(n)) => n
                .as_u64()
                .map(|v| v as usize)
                .context(ParsingJsonNumberSnafu {}),
            Some(JSValue::String(s)) => s.parse::<usize>().ok().context(ParsingJsonNumberSnafu {}),
            Some(_) => None.context(ParsingJsonNumberSnafu {}),
            None => Ok(default),
        }
    }
}

pub mod items_reader {
    use crate::replay::*;
    use calamine::{open_workbook, Reader, Xlsx};

    /// Reads one agenda item text per row from a spreadsheet column.
    pub fn read_items_xlsx(path: String, source: &ItemFileSource) -> ReplayResult<Vec<String>> {
        let p = path.clone();
        let mut workbook: Xlsx<_> =
            open_workbook(p).context(OpeningExcelSnafu { path: path.clone() })?;
        let wrange = workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu {})?
            .context(OpeningExcelSnafu { path })?;

        let column = source.item_column_index()?;
        let first_row = source.first_item_row()?;

        let mut res: Vec<String> = Vec::new();
        for (idx, row) in wrange.rows().enumerate() {
            // Row indices are 1-based, following spreadsheet conventions.
            if idx + 1 < first_row {
                continue;
            }
            debug!("workbook row: {:?}", row);
            match row.get(column) {
                Some(calamine::DataType::String(s)) if !s.trim().is_empty() => {
                    res.push(s.trim().to_string());
                }
                Some(calamine::DataType::String(_)) | Some(calamine::DataType::Empty) | None => {}
                Some(cell) => {
                    whatever!("read_items_xlsx: could not understand cell {:?}", cell)
                }
            }
        }
        Ok(res)
    }
}

fn validate_rules(
    script_rules: &Option<ScriptRules>,
    seed_override: Option<u64>,
) -> ReplayResult<SessionRules> {
    let mut rules = SessionRules::DEFAULT_RULES;
    if let Some(declared) = script_rules {
        if let Some(dots) = declared.dots_per_voter {
            rules.dots_per_voter = Some(dots);
        }
        if let Some(raw_seed) = &declared.random_seed {
            match raw_seed.parse::<u64>() {
                Result::Ok(seed) => rules.random_seed = Some(seed),
                Result::Err(_) => {
                    whatever!("Failed to understand randomSeed option: {:?}", raw_seed)
                }
            }
        }
        if let Some(estimation) = declared.estimation {
            rules.with_estimation = estimation;
        }
    }
    if let Some(seed) = seed_override {
        rules.random_seed = Some(seed);
    }
    Ok(rules)
}

fn require_field<'a>(
    field: &'a Option<String>,
    what: &str,
    step_idx: usize,
) -> ReplayResult<&'a str> {
    match field {
        Some(value) => Ok(value),
        None => whatever!("Missing {} in script step {}", what, step_idx),
    }
}

fn apply_step(
    participant: &mut Participant,
    step: &ScriptStep,
    step_idx: usize,
) -> ReplayResult<()> {
    debug!("step {}: {:?}", step_idx, step);
    match step.action.as_str() {
        "addItem" => {
            participant.add_item(require_field(&step.text, "text", step_idx)?);
        }
        "addItemBlock" => {
            participant.add_item_block(require_field(&step.text, "text", step_idx)?);
        }
        "voteForTop" => {
            let selection = match &step.selection {
                Some(selection) => selection,
                None => whatever!("Missing selection in script step {}", step_idx),
            };
            if let Result::Err(e) = participant.vote_for_top(selection) {
                whatever!("Vote rejected in script step {}: {}", step_idx, e)
            }
        }
        "estimate" => {
            let value = require_field(&step.value, "value", step_idx)?;
            if let Result::Err(e) = participant.save_estimate(&Estimate::parse(value)) {
                whatever!("Estimate rejected in script step {}: {}", step_idx, e)
            }
        }
        "estimateUnknown" => {
            if let Result::Err(e) = participant.save_estimate(&Estimate::Unknown) {
                whatever!("Estimate rejected in script step {}: {}", step_idx, e)
            }
        }
        "setState" => {
            let raw = require_field(&step.state, "state", step_idx)?;
            match SessionPhase::parse(raw) {
                Some(phase) => participant.set_session_state(phase),
                None => whatever!("Unknown state {:?} in script step {}", raw, step_idx),
            }
        }
        x => whatever!("Unknown action {:?} in script step {}", x, step_idx),
    }
    Ok(())
}

fn read_item_file(root_path: &Path, source: &ItemFileSource) -> ReplayResult<Vec<String>> {
    let p: PathBuf = [
        root_path.as_os_str().to_str().unwrap_or("").to_string(),
        source.file_path.clone(),
    ]
    .iter()
    .collect();
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read item file {:?}", p2);
    match source.provider.as_str() {
        "xlsx" => items_reader::read_items_xlsx(p2, source),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

fn build_summary_js(session: &SessionFile, reporter: &mut Participant) -> JSValue {
    let state = reporter.session_state().as_str().to_string();
    let dots_per_voter = reporter.dots_per_voter();
    let summary = reporter.vote_summary();

    let mut results: Vec<JSValue> = Vec::new();
    for votes in summary.sorted_items() {
        let mut tallies: JSMap<String, JSValue> = JSMap::new();
        for (raw, freq) in votes.estimate_tallies() {
            tallies.insert(raw.clone(), json!(freq));
        }
        results.push(json!({
            "id": votes.id.clone(),
            "boldText": votes.bold_text.clone(),
            "text": votes.text.clone(),
            "topVoteCount": votes.top_vote_count,
            "totalEstimates": votes.total_estimate_count,
            "finishedEstimates": votes.finished_estimate_count,
            "pendingEstimates": votes.pending_estimate_count(),
            "averageEstimate": votes.average_estimate(),
            "medianEstimate": votes.median_estimate(),
            "relativeStdDeviation": votes.relative_std_deviation(),
            "estimates": tallies,
        }));
    }

    json!({
        "config": {
            "session": session.session_name.clone(),
            "state": state,
            "voterCount": summary.voter_count(),
            "dotsPerVoter": dots_per_voter,
            "minFinishedEstimates": summary.min_finished_estimate_count(),
            "maxFinishedEstimates": summary.max_finished_estimate_count(),
        },
        "results": results,
    })
}

/// Replays a recorded session file against a fresh in-memory replica and
/// reports the aggregated summary.
pub fn run_session(
    config_path: String,
    check_summary_path: Option<String>,
    out_path: Option<String>,
    seed_override: Option<u64>,
) -> ReplayResult<()> {
    let session = read_session_file(&config_path)?;
    info!("session: {:?}", session);

    let rules = validate_rules(&session.rules, seed_override)?;

    if session.participants.is_empty() {
        whatever!("no participants declared");
    }

    let store: Rc<dyn ReplicatedStore> = Rc::new(MemoryStore::new());
    let mut participants: Vec<Participant> = Vec::new();
    for (idx, declared) in session.participants.iter().enumerate() {
        let mut participant_rules = rules.clone();
        // Decorrelate the participants' draws while keeping the replay
        // reproducible.
        participant_rules.random_seed = rules.random_seed.map(|seed| seed + idx as u64);
        let built = ParticipantBuilder::new(Rc::clone(&store), &declared.name)
            .clean(idx == 0)
            .admin(declared.admin.unwrap_or(false))
            .rules(participant_rules)
            .build();
        match built {
            Result::Ok(participant) => participants.push(participant),
            Result::Err(e) => {
                whatever!("Could not build participant {}: {}", declared.name, e)
            }
        }
    }

    if let Some(sources) = &session.item_file_sources {
        let root_path = Path::new(&config_path)
            .parent()
            .context(MissingParentDirSnafu {})?;
        for source in sources {
            let texts = read_item_file(root_path, source)?;
            let owner = match participants
                .iter_mut()
                .find(|p| p.name() == source.contributor)
            {
                Some(participant) => participant,
                None => whatever!("Unknown contributor {:?} in item file source", source.contributor),
            };
            for text in texts {
                owner.add_item(&text);
            }
        }
    }

    for (step_idx, step) in session.script.iter().enumerate() {
        let participant = participants
            .iter_mut()
            .find(|p| p.name() == step.participant)
            .context(UnknownParticipantSnafu {
                name: step.participant.clone(),
                step: step_idx,
            })?;
        apply_step(participant, step, step_idx)?;
    }

    // Every participant sees the same replica, so any of them can report.
    let reporter = &mut participants[0];
    let result_js = build_summary_js(&session, reporter);

    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    match out_path.as_deref() {
        None | Some("stdout") => println!("stats:{}", pretty_js_stats),
        Some(path) => fs::write(path, &pretty_js_stats).context(WritingSummarySnafu {})?,
    }

    // The reference summary, if provided for comparison
    if let Some(summary_path) = check_summary_path {
        let summary_ref = read_summary(summary_path)?;
        info!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between replayed summary and reference summary")
        }
    }

    Ok(())
}

fn run_replay_test(test_name: &str, session_lpath: &str, summary_lpath: &str) {
    let test_dir = option_env!("ESTIMATION_TEST_DIR").unwrap_or("test_data");
    info!("Running test {}", test_name);
    let res = run_session(
        format!("{}/{}/{}", test_dir, test_name, session_lpath),
        Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
        None,
        None,
    );
    if let Err(e) = &res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured {}", e);
    }
    assert!(res.is_ok(), "replay {} did not match its reference", test_name);
}

pub fn test_wrapper(test_name: &str) {
    run_replay_test(
        test_name,
        format!("{}_session.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    )
}
