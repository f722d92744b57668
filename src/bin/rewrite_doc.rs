use anyhow::{bail, Context};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use styleshift_lib::models::{ProcessingMode, Segment, Stage};
use styleshift_lib::services::document::extract_text;
use styleshift_lib::services::observer::preview;
use styleshift_lib::services::pipeline::{Progress, RunReport, SessionRunner};
use styleshift_lib::services::{
    split_text_into_segments, CompletionBackend, CompletionClient, ConfigStore, ProviderError,
};

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

const USAGE: &str = "Usage:\n  rewrite_doc <path.docx|.txt|.md> [--max-chars <n>] [--mode <paper_polish|paper_polish_enhance|emotion_polish>] [--stream] [--split-only] [--config <config.json>] [--out <json_path>]\n\nNotes:\n  - `--split-only` prints the segments and makes no model calls.\n  - Stage endpoints come from the config file; OPENAI_API_KEY / OPENAI_BASE_URL fill any gaps.";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output<'a> {
    file: &'a str,
    max_chars: usize,
    extracted_chars: usize,
    segments: &'a [Segment],
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<&'a RunReport>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || has_flag(&args, "--help") {
        eprintln!("{}", USAGE);
        return Ok(());
    }

    styleshift_lib::init_logging();

    let path = args[1].clone();
    let store = match parse_arg_value(&args, "--config") {
        Some(p) => ConfigStore::at_file(p.into()),
        None => match ConfigStore::default_config_dir() {
            Some(dir) => ConfigStore::new(dir),
            None => bail!("no config directory available; pass --config"),
        },
    };
    let config = store.load()?;

    let max_chars = match parse_arg_value(&args, "--max-chars") {
        Some(v) => v.parse().with_context(|| format!("invalid --max-chars: {}", v))?,
        None => config.segmentation.max_chars,
    };
    let mode: ProcessingMode = match parse_arg_value(&args, "--mode") {
        Some(m) => m.parse()?,
        None => ProcessingMode::default(),
    };
    let streaming = has_flag(&args, "--stream");
    let split_only = has_flag(&args, "--split-only");
    let out_path = parse_arg_value(&args, "--out");

    let bytes = std::fs::read(&path).with_context(|| format!("read file failed: {}", path))?;
    let file_name = std::path::Path::new(&path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.clone());

    let text = extract_text(&file_name, &bytes)?;
    let segments = split_text_into_segments(&text, max_chars)?;

    println!("File: {}", path);
    println!("Extracted: {} chars ({} bytes)", text.chars().count(), text.len());
    println!("Max chars: {}", max_chars);
    println!("Segments: {}", segments.len());
    println!();

    if split_only {
        for s in &segments {
            println!("[S{:04}] len={}  {}", s.index, s.effective_length, preview(&s.source_text, 120));
        }
    }

    let run = if split_only {
        None
    } else {
        println!("Mode: {}", mode.as_str());
        let mut runner = SessionRunner::new(config.stage_prompts(), config.compression_policy()).streaming(streaming);
        for &stage in mode.stages() {
            let stage_cfg = config.stage(stage);
            runner = runner.with_sampling(stage, stage_cfg.temperature, stage_cfg.max_tokens);
        }

        let backend_for = |stage: Stage| -> Result<Arc<dyn CompletionBackend>, ProviderError> {
            let model = config.resolve_model_config(stage)?;
            let client: Arc<dyn CompletionBackend> = Arc::new(CompletionClient::new(model)?);
            Ok(client)
        };

        let mut stdout = std::io::stdout();
        let report = runner
            .run_mode(&backend_for, mode, &segments, &mut |p| match p {
                Progress::SegmentStarted { stage, index, total } => {
                    eprintln!("[{}] segment {}/{}", stage, index + 1, total);
                }
                Progress::Chunk { text, .. } => {
                    let _ = write!(stdout, "{}", text);
                    let _ = stdout.flush();
                }
                Progress::SegmentFinished { .. } if streaming => {
                    let _ = writeln!(stdout);
                }
                Progress::HistoryCompressed { stage, before, after } => {
                    eprintln!("[{}] history compressed {} -> {}", stage, before, after);
                }
                _ => {}
            })
            .await?;

        if !streaming {
            println!();
            println!("{}", report.final_text());
        }
        Some(report)
    };

    if let Some(out_path) = out_path {
        let out = Output {
            file: &path,
            max_chars,
            extracted_chars: text.chars().count(),
            segments: &segments,
            run: run.as_ref(),
        };
        let json = serde_json::to_string_pretty(&out)?;
        std::fs::write(&out_path, json).with_context(|| format!("write out failed: {}", out_path))?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}
