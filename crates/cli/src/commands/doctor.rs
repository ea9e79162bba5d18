use serde::Serialize;
use storepulse_core::config::{AppConfig, LoadOptions};
use storepulse_core::recommender::trainer::MIN_RATINGS;
use storepulse_core::recommender::{ArtifactState, ArtifactStore};
use storepulse_core::PurchaseCorpus;

use super::{CommandResult, EXIT_CONFIG, EXIT_OK};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Fail { EXIT_CONFIG } else { EXIT_OK };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let corpus = check_corpus(&config, &mut checks);
            checks.push(check_training_readiness(&config, corpus.as_ref()));
            checks.push(check_artifacts(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["corpus_readable", "training_readiness", "model_artifacts"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let any_warn = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = if any_fail {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else if any_warn {
        (CheckStatus::Warn, "doctor: ready, with warnings")
    } else {
        (CheckStatus::Pass, "doctor: all readiness checks passed")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_corpus(config: &AppConfig, checks: &mut Vec<DoctorCheck>) -> Option<PurchaseCorpus> {
    match PurchaseCorpus::from_csv_path(&config.data.corpus_path) {
        Ok(corpus) => {
            checks.push(DoctorCheck {
                name: "corpus_readable",
                status: CheckStatus::Pass,
                details: format!(
                    "{} records, {} customers, {} products in `{}`",
                    corpus.len(),
                    corpus.distinct_customers().len(),
                    corpus.distinct_products().len(),
                    config.data.corpus_path.display()
                ),
            });
            Some(corpus)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "corpus_readable",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            None
        }
    }
}

fn check_training_readiness(config: &AppConfig, corpus: Option<&PurchaseCorpus>) -> DoctorCheck {
    let Some(corpus) = corpus else {
        return DoctorCheck {
            name: "training_readiness",
            status: CheckStatus::Skipped,
            details: "skipped because the corpus did not load".to_string(),
        };
    };

    let required = MIN_RATINGS.max(config.model.cv_folds);
    if corpus.len() < required {
        return DoctorCheck {
            name: "training_readiness",
            status: CheckStatus::Fail,
            details: format!("need at least {required} ratings to train, found {}", corpus.len()),
        };
    }

    DoctorCheck {
        name: "training_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "{} grid candidates x {} folds over {} ratings",
            config.grid.candidate_count(),
            config.model.cv_folds,
            corpus.len()
        ),
    }
}

fn check_artifacts(config: &AppConfig) -> DoctorCheck {
    let store = ArtifactStore::new(&config.model.artifact_dir);
    match store.state() {
        ArtifactState::Missing => DoctorCheck {
            name: "model_artifacts",
            status: CheckStatus::Warn,
            details: format!(
                "no artifacts in `{}`; the next command will train a model",
                store.dir().display()
            ),
        },
        ArtifactState::Partial => DoctorCheck {
            name: "model_artifacts",
            status: CheckStatus::Warn,
            details: "only one of model.json / best_params.json exists; the next command will retrain"
                .to_string(),
        },
        ArtifactState::Present => match store.load() {
            Ok(Some((model, params))) => DoctorCheck {
                name: "model_artifacts",
                status: CheckStatus::Pass,
                details: format!(
                    "model with {} factors over {} customers and {} products, trained {}",
                    model.params().n_factors,
                    model.customer_count(),
                    model.product_count(),
                    params.trained_at.to_rfc3339()
                ),
            },
            Ok(None) => DoctorCheck {
                name: "model_artifacts",
                status: CheckStatus::Warn,
                details: "artifacts disappeared while checking".to_string(),
            },
            Err(error) => DoctorCheck {
                name: "model_artifacts",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
