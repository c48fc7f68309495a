mod config;
mod manifest;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, ProviderKind, StoreKind};
use facematch_core::session::{default_pairs, DEFAULT_LAYOUT};
use facematch_core::{
    Aggregator, CaseFilter, ComparisonStore, MatchPolicy, Provider, Session, SlotPosition,
};
use facematch_remote::{GeminiConfig, GeminiJudge};
use facematch_store::{MemoryStore, SqliteStore};
use manifest::{parse_pair_arg, Manifest, PairEntry};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facematch", about = "Pairwise face comparison for identity verification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare image pairs and print the result table
    Compare {
        /// Case to save scored results under
        #[arg(short, long)]
        case: Option<String>,
        /// TOML manifest listing images per pair
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Pair images as ID=FIRST,SECOND (repeatable)
        #[arg(short, long = "pair", value_parser = parse_pair_arg)]
        pairs: Vec<PairEntry>,
        /// Override FACEMATCH_PROVIDER
        #[arg(long, value_enum)]
        provider: Option<ProviderKind>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cases
    Cases {
        #[arg(short, long)]
        limit: Option<usize>,
        /// Match against application number or applicant name
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show the saved comparisons of a case
    Show {
        case_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Register a new case
    NewCase {
        application_number: String,
        applicant_name: String,
    },
    /// List the comparison pairs and their slots
    Pairs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Compare {
            case,
            manifest,
            pairs,
            provider,
            json,
        } => {
            if let Some(provider) = provider {
                config.provider = provider;
            }
            let manifest = match manifest {
                Some(path) => Manifest::load(&path)?,
                None => Manifest::default(),
            };
            let case_id = case.or(manifest.case);
            let entries: Vec<PairEntry> = manifest.pairs.into_iter().chain(pairs).collect();
            if entries.is_empty() {
                bail!("no images given; pass --pair ID=FIRST,SECOND or --manifest FILE");
            }

            let store = match &case_id {
                Some(_) => Some(open_store(&config).await?),
                None => None,
            };
            let mut session =
                prepare_session(store.as_deref(), case_id.as_deref(), &entries).await?;
            let provider = build_provider(&config)?;
            let aggregator = Aggregator::new(
                MatchPolicy::new(config.match_threshold),
                config.min_confidence,
            );

            let ack = session
                .compare(&aggregator, &provider, store.as_deref())
                .await;

            let report = session.report();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
                println!("{} of {} pairs matched", report.matches(), report.rows.len());
            }
            if let (Some(ack), Some(case_id)) = (ack, &case_id) {
                eprintln!("Saved {} comparison(s) to case {case_id}", ack.saved);
            }
        }
        Commands::Cases { limit, query, json } => {
            let store = open_store(&config).await?;
            let cases = store.list(&CaseFilter { limit, query }).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cases)?);
            } else if cases.is_empty() {
                println!("No cases found");
            } else {
                for case in &cases {
                    println!(
                        "{:<12} {:<28} {}",
                        case.application_number, case.applicant_name, case.id
                    );
                }
            }
        }
        Commands::Show { case_id, json } => {
            let store = open_store(&config).await?;
            let session = Session::load_case(store.as_ref(), &case_id, default_pairs())
                .await
                .with_context(|| format!("failed to load case {case_id}"))?;
            let report = session.report();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
        Commands::NewCase {
            application_number,
            applicant_name,
        } => {
            if config.store != StoreKind::Sqlite {
                bail!("new-case needs the sqlite store (unset FACEMATCH_STORE)");
            }
            let store = open_sqlite(&config).await?;
            let case = store
                .create_case(&application_number, &applicant_name)
                .await?;
            println!("{}", case.id);
        }
        Commands::Pairs => {
            for (id, title, first, second) in DEFAULT_LAYOUT {
                println!("{id:<12} {title}");
                println!("{:<12}   1: {first}", "");
                println!("{:<12}   2: {second}", "");
            }
        }
    }

    Ok(())
}

/// Start from the case's saved results when there is a case, then apply the
/// uploads. Uploaded pairs go back to `Pending`; the rest keep their scores.
async fn prepare_session(
    store: Option<&dyn ComparisonStore>,
    case_id: Option<&str>,
    entries: &[PairEntry],
) -> Result<Session> {
    let mut session = match (store, case_id) {
        (Some(store), Some(case_id)) => Session::load_case(store, case_id, default_pairs())
            .await
            .with_context(|| format!("failed to load case {case_id}"))?,
        (None, Some(case_id)) => Session::default().with_case(case_id),
        _ => Session::default(),
    };
    for entry in entries {
        upload_entry(&mut session, entry).await?;
    }
    Ok(session)
}

async fn upload_entry(session: &mut Session, entry: &PairEntry) -> Result<()> {
    let slots = [
        (SlotPosition::First, &entry.first),
        (SlotPosition::Second, &entry.second),
    ];
    for (position, path) in slots {
        let Some(path) = path else {
            continue;
        };
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        session
            .upload(&entry.id, position, bytes, filename)
            .with_context(|| format!("pair {}: cannot use {}", entry.id, path.display()))?;
    }
    Ok(())
}

fn build_provider(config: &Config) -> Result<Provider> {
    match config.provider {
        ProviderKind::Embedded => {
            let engine = facematch_vision::spawn_onnx_engine(
                &config.detector_model_path(),
                &config.recognizer_model_path(),
            )
            .with_context(|| {
                format!("failed to load face models from {}", config.model_dir.display())
            })?;
            Ok(Provider::Embedded(Arc::new(engine)))
        }
        ProviderKind::Remote => {
            let Some(api_key) = config.api_key.clone() else {
                bail!("remote provider needs an API key (FACEMATCH_API_KEY or API_KEY)");
            };
            let mut remote = GeminiConfig::new(api_key);
            remote.model = config.remote_model.clone();
            remote.endpoint = config.remote_endpoint.clone();
            let judge = GeminiJudge::new(remote)?;
            tracing::info!(model = judge.model(), "using remote provider");
            Ok(Provider::Remote(Arc::new(judge)))
        }
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn ComparisonStore>> {
    match config.store {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::with_demo_cases())),
        StoreKind::Sqlite => Ok(Arc::new(open_sqlite(config).await?)),
    }
}

async fn open_sqlite(config: &Config) -> Result<SqliteStore> {
    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    SqliteStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open {}", config.db_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::store::{StoredImage, STATUS_MATCH};
    use facematch_core::{ImagePair, StoredComparison};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 80, 120]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn saved(pair_id: &str) -> StoredComparison {
        StoredComparison {
            pair_id: pair_id.into(),
            first_image: Some(StoredImage {
                bytes: png(4, 4),
                filename: None,
            }),
            second_image: Some(StoredImage {
                bytes: png(5, 5),
                filename: None,
            }),
            similarity: 77.0,
            match_status: STATUS_MATCH.into(),
            confidence: Some(95.0),
            distance: Some(0.23),
            details: serde_json::json!({ "provider": "embedded" }),
            created_at: chrono::Utc::now(),
        }
    }

    fn pair<'a>(session: &'a Session, id: &str) -> &'a ImagePair {
        session.pair(id).unwrap()
    }

    #[tokio::test]
    async fn test_prepare_session_restores_case_before_uploads() {
        let dir = std::env::temp_dir().join(format!("facematch-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let first = dir.join("rtp.png");
        let second = dir.join("portal.png");
        std::fs::write(&first, png(6, 6)).unwrap();
        std::fs::write(&second, png(7, 7)).unwrap();

        let store = MemoryStore::with_demo_cases();
        store
            .save("1", vec![saved("kyc-kyc"), saved("rtp-portal")])
            .await
            .unwrap();

        let entries = [PairEntry {
            id: "rtp-portal".into(),
            first: Some(first),
            second: Some(second),
        }];
        let session = prepare_session(Some(&store), Some("1"), &entries)
            .await
            .unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(session.case_id(), Some("1"));
        let restored = pair(&session, "kyc-kyc").outcome.scored().unwrap();
        assert_eq!(restored.similarity, 77.0);
        let uploaded = pair(&session, "rtp-portal");
        assert!(uploaded.outcome.is_pending());
        assert_eq!(uploaded.first.filename.as_deref(), Some("rtp.png"));
        assert!(pair(&session, "kyc-rtp").outcome.is_pending());
    }

    #[tokio::test]
    async fn test_prepare_session_without_case() {
        let session = prepare_session(None, None, &[]).await.unwrap();
        assert_eq!(session.case_id(), None);
        assert!(session.pairs().iter().all(|p| p.outcome.is_pending()));
    }
}
