use conidia::annotation::AnnotationsPayload;
use conidia::error::LabError;
use conidia::experiment::LabState;
use conidia::local_store::LocalEvidenceBackend;
use conidia::photo_store::{DayPhoto, EvidenceStore};
use conidia::progress;
use conidia::render_caption::{CaptionContext, bake_caption_jpeg};
use conidia::render_overlay::decode_raster;
use conidia::storage_path::assert_valid_test_photo_path;
use conidia::test_record::Day;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::{env, fs};

const DEFAULT_STATE_PATH: &str = ".conidia_state.json";

#[derive(Serialize)]
struct StateSummary {
    experiment_count: usize,
    test_count: usize,
    experiments: Vec<ExperimentSummary>,
}

#[derive(Serialize)]
struct ExperimentSummary {
    id: String,
    number: u32,
    strain: String,
    repetition_count: u32,
    test_count: u32,
    recorded_tests: usize,
}

#[derive(Deserialize)]
struct BakeSpec {
    #[serde(flatten)]
    context: CaptionContextSpec,
    #[serde(default)]
    photo_number: Option<u32>,
    #[serde(default)]
    annotations: Option<AnnotationsPayload>,
}

#[derive(Deserialize)]
struct CaptionContextSpec {
    experiment_number: u32,
    repetition_number: u32,
    test_number: u32,
    day: Day,
    strain: String,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    test_lot: Option<String>,
}

fn usage() {
    eprintln!(
        "Usage:\n  \
  conidia_cli --version\n  \
  conidia_cli [--state PATH] state-summary\n  \
  conidia_cli [--state PATH] progress EXPERIMENT_ID\n  \
  conidia_cli [--state PATH] test-status EXPERIMENT_ID REPETITION TEST\n  \
  conidia_cli [--state PATH] replace-test '<record-json>'\n  \
  conidia_cli validate-path STORAGE_PATH OWNER_UUID [TEST_UUID]\n  \
  conidia_cli replace-photos STORE_DIR OWNER_UUID TEST_UUID DAY IMAGE...\n  \
  conidia_cli bake-caption INPUT_IMAGE OUTPUT.jpg '<caption-json>'\n\n  \
  Tip: pass @file.json instead of inline JSON"
    );
}

fn load_json_arg(value: &str) -> Result<String, String> {
    if let Some(path) = value.strip_prefix('@') {
        fs::read_to_string(path).map_err(|e| format!("Could not read JSON file '{path}': {e}"))
    } else {
        Ok(value.to_string())
    }
}

fn load_state(path: &str) -> Result<LabState, String> {
    if Path::new(path).exists() {
        LabState::load_from_path(path).map_err(|e| e.to_string())
    } else {
        Ok(LabState::default())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

fn parse_global_state_arg(args: &[String]) -> (String, usize) {
    if args.len() >= 3 && args[1] == "--state" {
        return (args[2].clone(), 3);
    }
    (DEFAULT_STATE_PATH.to_string(), 1)
}

fn summarize_state(state: &LabState) -> StateSummary {
    let mut experiments: Vec<ExperimentSummary> = state
        .experiments
        .values()
        .map(|exp| ExperimentSummary {
            id: exp.id.clone(),
            number: exp.number,
            strain: exp.strain.clone(),
            repetition_count: exp.repetition_count,
            test_count: exp.test_count,
            recorded_tests: state.tests_of_experiment(&exp.id).len(),
        })
        .collect();
    experiments.sort_by(|a, b| a.id.cmp(&b.id));

    StateSummary {
        experiment_count: experiments.len(),
        test_count: state.tests.len(),
        experiments,
    }
}

fn parse_day(value: &str) -> Result<Day, String> {
    let number: u8 = value
        .parse()
        .map_err(|_| format!("day must be 7 or 14, got '{value}'"))?;
    Day::try_from(number)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("conidia {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let (state_path, command_index) = parse_global_state_arg(&args);
    let command_args = &args[command_index..];
    let Some(command) = command_args.first() else {
        usage();
        return Err("Missing command".to_string());
    };

    match command.as_str() {
        "state-summary" => {
            let state = load_state(&state_path)?;
            print_json(&summarize_state(&state))
        }
        "progress" => {
            let [_, experiment_id] = command_args else {
                usage();
                return Err("progress needs EXPERIMENT_ID".to_string());
            };
            let state = load_state(&state_path)?;
            let experiment = state.experiment(experiment_id).map_err(|e| e.to_string())?;
            let records = state.tests_of_experiment(experiment_id);
            print_json(&progress::evaluate(experiment, &records))
        }
        "test-status" => {
            let [_, experiment_id, repetition, test] = command_args else {
                usage();
                return Err("test-status needs EXPERIMENT_ID REPETITION TEST".to_string());
            };
            let repetition: u32 = repetition
                .parse()
                .map_err(|_| "REPETITION must be a number".to_string())?;
            let test: u32 = test.parse().map_err(|_| "TEST must be a number".to_string())?;

            let state = load_state(&state_path)?;
            let experiment = state.experiment(experiment_id).map_err(|e| e.to_string())?;
            let records = state.tests_of_experiment(experiment_id);
            let report = progress::evaluate(experiment, &records);
            let slot = report
                .repetition(repetition)
                .and_then(|rep| rep.tests.iter().find(|t| t.test_number == test))
                .ok_or_else(|| format!("No slot for repetition {repetition}, test {test}"))?;
            print_json(slot)
        }
        "replace-test" => {
            let [_, record_json] = command_args else {
                usage();
                return Err("replace-test needs a record JSON".to_string());
            };
            let text = load_json_arg(record_json)?;
            let record = serde_json::from_str(&text)
                .map_err(|e| format!("Could not parse test record JSON: {e}"))?;
            let mut state = load_state(&state_path)?;
            let revision = state.replace_test(record).map_err(|e| e.to_string())?;
            state.save_to_path(&state_path).map_err(|e| e.to_string())?;
            println!("Replaced; record is now at revision {revision}");
            Ok(())
        }
        "validate-path" => {
            let (storage_path, owner, test) = match command_args {
                [_, storage_path, owner] => (storage_path, owner, None),
                [_, storage_path, owner, test] => (storage_path, owner, Some(test.as_str())),
                _ => {
                    usage();
                    return Err("validate-path needs STORAGE_PATH OWNER_UUID [TEST_UUID]".to_string());
                }
            };
            assert_valid_test_photo_path(storage_path, owner, test).map_err(|e| e.to_string())?;
            println!("OK: {storage_path}");
            Ok(())
        }
        "replace-photos" => {
            let [_, store_dir, owner, test_id, day, images @ ..] = command_args else {
                usage();
                return Err(
                    "replace-photos needs STORE_DIR OWNER_UUID TEST_UUID DAY IMAGE...".to_string(),
                );
            };
            let day = parse_day(day)?;
            let mut photos = Vec::with_capacity(images.len());
            for image_path in images {
                let bytes = fs::read(image_path)
                    .map_err(|e| format!("Could not read image '{image_path}': {e}"))?;
                photos.push(DayPhoto::Captured(bytes));
            }

            let backend = Arc::new(
                LocalEvidenceBackend::open(Path::new(store_dir)).map_err(|e| e.to_string())?,
            );
            let store = EvidenceStore::new(backend.clone(), backend, owner)
                .map_err(|e: LabError| e.to_string())?;
            let outcome = store
                .replace_day_photos(test_id, day, &photos)
                .map_err(|e| e.to_string())?;
            println!("Uploaded {} photo(s) for day {day}", outcome.uploaded);

            // Refresh the record's photo path list when the test is known.
            let mut state = load_state(&state_path)?;
            if let Some(existing) = state.find_test_by_id(test_id) {
                let mut updated = existing.clone();
                let paths = store
                    .single_photos_for_day(test_id, day)
                    .map_err(|e| e.to_string())?
                    .into_iter()
                    .map(|asset| asset.storage_path)
                    .collect();
                updated.set_photo_paths_for_day(day, paths);
                state.replace_test(updated).map_err(|e| e.to_string())?;
                state.save_to_path(&state_path).map_err(|e| e.to_string())?;
            }
            Ok(())
        }
        "bake-caption" => {
            let [_, input, output, spec_json] = command_args else {
                usage();
                return Err("bake-caption needs INPUT_IMAGE OUTPUT.jpg '<caption-json>'".to_string());
            };
            let text = load_json_arg(spec_json)?;
            let spec: BakeSpec = serde_json::from_str(&text)
                .map_err(|e| format!("Could not parse caption JSON: {e}"))?;

            let bytes =
                fs::read(input).map_err(|e| format!("Could not read image '{input}': {e}"))?;
            let raster = decode_raster(&bytes).map_err(|e| e.to_string())?;

            let ctx = CaptionContext {
                experiment_number: spec.context.experiment_number,
                repetition_number: spec.context.repetition_number,
                test_number: spec.context.test_number,
                day: spec.context.day,
                strain: spec.context.strain,
                unit: spec.context.unit,
                test_lot: spec.context.test_lot,
            };
            let photo_number = spec.photo_number.unwrap_or(1);
            let markers = spec
                .annotations
                .map(|payload| payload.normalize())
                .unwrap_or_default()
                .remove(&0)
                .unwrap_or_default();

            let jpeg = bake_caption_jpeg(&raster, &ctx, photo_number, &markers)
                .map_err(|e| e.to_string())?;
            fs::write(output, jpeg)
                .map_err(|e| format!("Could not write output '{output}': {e}"))?;
            println!("Wrote {output}");
            Ok(())
        }
        other => {
            usage();
            Err(format!("Unknown command '{other}'"))
        }
    }
}
