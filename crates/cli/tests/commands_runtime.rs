use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use storepulse_cli::commands::{
    config, customer, doctor, popularity, profitability, recommend, segments, summary, train,
};
use storepulse_cli::GlobalArgs;
use chrono::NaiveDate;
use storepulse_core::config::{AppConfig, LoadOptions};
use storepulse_core::PurchaseFilter;
use tempfile::TempDir;

const CORPUS: &str = "\
Customer_ID,Product_ID,Category,Subcategory,Purchase_Amount,Purchase_Quantity,Purchase_Date,Unit_Price
1,101,Electronics,Laptops,1200.00,1,2024-01-03,1200.00
1,102,Electronics,Headphones,150.00,1,2024-01-05,150.00
1,104,Books,Fiction,24.50,2,2024-02-11,12.25
2,101,Electronics,Laptops,999.99,1,2024-01-09,999.99
2,103,Home,Kitchen,80.00,2,2024-01-21,40.00
2,105,Beauty,Skincare,35.00,1,2024-03-02,35.00
3,103,Home,Kitchen,95.00,1,2024-02-01,95.00
3,104,Books,Fiction,18.00,1,2024-02-02,18.00
3,105,Beauty,Skincare,42.00,2,2024-02-14,21.00
4,102,Electronics,Headphones,130.00,1,2024-03-04,130.00
4,104,Books,Fiction,22.00,1,2024-03-20,22.00
5,101,Electronics,Laptops,1100.00,1,2024-04-01,1100.00
";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("purchases.csv"), CORPUS).expect("corpus should be written");
        let toml = format!(
            r#"
[data]
corpus_path = "{corpus}"

[model]
artifact_dir = "{artifacts}"
parallel = false

[grid]
n_factors = [2, 4]
n_epochs = [5]
lr_all = [0.005]
reg_all = [0.02, 0.05]

[segmentation]
clusters = 3
"#,
            corpus = dir.path().join("purchases.csv").display(),
            artifacts = dir.path().join("artifacts").display(),
        );
        fs::write(dir.path().join("storepulse.toml"), toml).expect("config should be written");
        Self { dir }
    }

    fn global_args(&self) -> GlobalArgs {
        GlobalArgs {
            config: Some(self.dir.path().join("storepulse.toml")),
            ..GlobalArgs::default()
        }
    }

    fn options(&self) -> LoadOptions {
        self.global_args().load_options()
    }

    fn config(&self) -> AppConfig {
        AppConfig::load(self.options()).expect("workspace config should load")
    }

    fn model_path(&self) -> PathBuf {
        self.dir.path().join("artifacts").join("model.json")
    }
}

#[test]
fn train_stores_artifacts_then_reuses_them() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let config = workspace.config();

        let first = train::run(&config, false);
        assert_eq!(first.exit_code, 0, "expected training to succeed: {}", first.output);
        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "train");
        assert_eq!(payload["data"]["origin"], "trained");
        assert_eq!(payload["data"]["candidates_evaluated"], 4);
        assert!(payload["data"]["holdout"]["rmse"].is_number());
        assert!(workspace.model_path().is_file());

        let second = train::run(&config, false);
        assert_eq!(parse_payload(&second.output)["data"]["origin"], "loaded");

        let forced = train::run(&config, true);
        assert_eq!(parse_payload(&forced.output)["data"]["origin"], "trained");
    });
}

#[test]
fn recommend_returns_ranked_unpurchased_products() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = recommend::run(&workspace.config(), 3, Some(2));
        assert_eq!(result.exit_code, 0, "expected recommendations: {}", result.output);

        let payload = parse_payload(&result.output);
        let items = payload["data"].as_array().expect("data should be an array");
        assert_eq!(items.len(), 2);
        for item in items {
            let product = item["Product_ID"].as_i64().expect("product id");
            assert!(![103, 104, 105].contains(&product), "customer 3 already bought {product}");
            let reason = item["Reason"].as_str().expect("reason");
            assert!(reason.starts_with("Recommended because "));
        }
        let first = items[0]["Estimated_Rating"].as_f64().expect("rating");
        let second = items[1]["Estimated_Rating"].as_f64().expect("rating");
        assert!(first >= second);
    });
}

#[test]
fn recommend_rejects_zero_count() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = recommend::run(&workspace.config(), 1, Some(0));

        assert_eq!(result.exit_code, 5);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_request");
    });
}

#[test]
fn recommend_for_unknown_customer_reports_fallback() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = recommend::run(&workspace.config(), 999, None);

        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        assert!(payload["message"].as_str().unwrap_or_default().contains("no purchase history"));
        let items = payload["data"].as_array().expect("data should be an array");
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|item| item["Prediction_Kind"] == "bias_only_fallback"));
    });
}

#[test]
fn missing_corpus_is_a_data_failure() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let mut config = workspace.config();
        config.data.corpus_path = workspace.dir.path().join("absent.csv");

        let result = train::run(&config, false);
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "data_unavailable");
    });
}

#[test]
fn corrupt_model_artifact_is_reported_not_retrained() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let config = workspace.config();
        assert_eq!(train::run(&config, false).exit_code, 0);

        fs::write(workspace.model_path(), "{\"params\":").expect("model should be truncated");
        let result = recommend::run(&config, 1, None);
        assert_eq!(result.exit_code, 4);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "artifact_load");
        assert!(payload["hint"].as_str().is_some());
    });
}

#[test]
fn analytics_commands_return_narratives() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let config = workspace.config();

        let summary = parse_payload(&summary::run(&config, &PurchaseFilter::default()).output);
        assert_eq!(summary["data"]["metrics"]["Top Category"], "Electronics");
        assert_eq!(summary["data"]["metrics"]["Total Revenue"], "$3,896.49");

        let popularity = parse_payload(&popularity::run(&config, Some(2)).output);
        let rows = popularity["data"].as_array().expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["product_id"], 101);

        let books = category("Books");
        let profitability = parse_payload(&profitability::run(&config, &books).output);
        assert!(profitability["message"]
            .as_str()
            .unwrap_or_default()
            .starts_with("The product '104 (Fiction)' generated the highest revenue of $64.50."));

        let missing = profitability::run(&config, &category("Garden"));
        assert_eq!(missing.exit_code, 5);
    });
}

#[test]
fn customer_summary_for_known_and_unknown_customers() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let config = workspace.config();

        let known = parse_payload(&customer::run(&config, 2, &PurchaseFilter::default()).output);
        assert_eq!(
            known["message"],
            "Customer 2 has spent a total of $1,114.99 across 4 items purchased. Their average \
             spending per purchase is $371.66."
        );

        let unknown = customer::run(&config, 77, &PurchaseFilter::default());
        assert_eq!(unknown.exit_code, 5);
    });
}

#[test]
fn summary_respects_inclusive_date_range() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let filter = PurchaseFilter {
            start: NaiveDate::from_ymd_opt(2024, 2, 1),
            end: NaiveDate::from_ymd_opt(2024, 3, 4),
            category: None,
        };

        let result = summary::run(&workspace.config(), &filter);
        assert_eq!(result.exit_code, 0, "expected filtered summary: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "summarised 6 purchase records");
        assert_eq!(payload["data"]["metrics"]["Total Revenue"], "$344.50");
        assert_eq!(payload["data"]["filter"]["start"], "2024-02-01");
    });
}

#[test]
fn filter_without_matches_is_an_invalid_request() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let filter = PurchaseFilter {
            start: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..PurchaseFilter::default()
        };

        let result = summary::run(&workspace.config(), &filter);
        assert_eq!(result.exit_code, 5);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_request");
        assert!(payload["message"].as_str().unwrap_or_default().contains("from 2025-01-01"));
    });
}

#[test]
fn customer_summary_within_a_category() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = customer::run(&workspace.config(), 2, &category("Home"));

        assert_eq!(
            parse_payload(&result.output)["message"],
            "Customer 2 has spent a total of $80.00 across 2 items purchased. Their average \
             spending per purchase is $80.00."
        );
    });
}

#[test]
fn seed_flag_is_attributed_to_the_override() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let mut args = workspace.global_args();
        args.seed = Some(9);

        let payload = parse_payload(&config::run(args.load_options()).output);
        let seed = payload["data"]
            .as_array()
            .and_then(|entries| entries.iter().find(|entry| entry["key"] == "model.seed"))
            .cloned()
            .unwrap_or_default();
        assert_eq!(seed["value"], "9");
        assert_eq!(seed["source"], "override (--seed)");
    });
}

#[test]
fn segments_cover_every_customer() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = segments::run(&workspace.config());
        assert_eq!(result.exit_code, 0, "expected segmentation: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["assignments"].as_array().map(Vec::len), Some(5));
        assert_eq!(payload["data"]["summaries"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn config_reports_source_attribution() {
    with_env(&[("STOREPULSE_MODEL_SEED", "7")], || {
        let workspace = Workspace::new();
        let mut args = workspace.global_args();
        args.data = Some(workspace.dir.path().join("purchases.csv"));

        let result = config::run(args.load_options());
        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        let entries = payload["data"].as_array().expect("entries");
        let source_of = |key: &str| {
            entries
                .iter()
                .find(|entry| entry["key"] == key)
                .and_then(|entry| entry["source"].as_str())
                .unwrap_or_default()
                .to_string()
        };

        assert_eq!(source_of("data.corpus_path"), "override (--data)");
        assert_eq!(source_of("model.seed"), "env (STOREPULSE_MODEL_SEED)");
        assert!(source_of("grid.n_factors").starts_with("file ("));
        assert_eq!(source_of("recommend.default_count"), "default");
    });
}

#[test]
fn invalid_env_override_fails_config() {
    with_env(&[("STOREPULSE_MODEL_PARALLEL", "sometimes")], || {
        let workspace = Workspace::new();
        let result = config::run(workspace.options());

        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn doctor_reports_missing_artifacts_as_warning() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = doctor::run(workspace.options(), true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "warn");
        let checks = payload["checks"].as_array().expect("checks");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[1]["status"], "pass");
        assert_eq!(checks[3]["name"], "model_artifacts");
        assert_eq!(checks[3]["status"], "warn");
    });
}

#[test]
fn doctor_fails_when_corpus_is_missing() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let mut args = workspace.global_args();
        args.data = Some(workspace.dir.path().join("absent.csv"));

        let result = doctor::run(args.load_options(), false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] corpus_readable"));
        assert!(result.output.contains("- [skip] training_readiness"));
    });
}

fn category(name: &str) -> PurchaseFilter {
    PurchaseFilter { category: Some(name.to_owned()), ..PurchaseFilter::default() }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STOREPULSE_DATA_CORPUS_PATH",
        "STOREPULSE_MODEL_ARTIFACT_DIR",
        "STOREPULSE_MODEL_CV_FOLDS",
        "STOREPULSE_MODEL_TEST_FRACTION",
        "STOREPULSE_MODEL_SEED",
        "STOREPULSE_MODEL_PARALLEL",
        "STOREPULSE_MODEL_INVALIDATE_ON_CORPUS_CHANGE",
        "STOREPULSE_RECOMMEND_DEFAULT_COUNT",
        "STOREPULSE_SEGMENTATION_CLUSTERS",
        "STOREPULSE_SEGMENTATION_SEED",
        "STOREPULSE_LOGGING_LEVEL",
        "STOREPULSE_LOGGING_FORMAT",
        "STOREPULSE_LOG_LEVEL",
        "STOREPULSE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
