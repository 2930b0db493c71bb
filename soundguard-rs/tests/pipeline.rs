use std::path::{Path, PathBuf};
use std::sync::Arc;

use soundguard::{
    CaptionTokenizer, Catalog, DummyBackend, Embedding, InferenceBackend, Pipeline,
    PipelineConfig, StopReason, SubwordTokenizer, TextTokenizer, TextTokenizerKind, VocabFamily,
    Vocabulary,
};

const CAPTION_VOCAB: &str = r#"{"model": {"vocab": {
    "<pad>": 0, "<start>": 1, "<end>": 2, "<unk>": 3,
    "a": 4, "dog": 5, "barks": 6, "door": 7, "bell": 8, "rings": 9, "loudly": 10
}}}"#;

const TEXT_VOCAB: &str = r#"{
  "model": {"type": "BPE", "vocab": {
    "<s>": 0, "<pad>": 1, "</s>": 2, "<unk>": 3,
    "Ġa": 4, "Ġdog": 5, "Ġbarks": 6, "Ġdoor": 7, "Ġbell": 8, "Ġrings": 9
  }, "merges": []},
  "added_tokens": [{"id": 10, "content": "<mask>"}]
}"#;

fn write_tone(path: &Path, seconds: f32, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("wav writer");
    let n = (seconds * sample_rate as f32) as usize;
    for i in 0..n {
        let t = i as f32 / sample_rate as f32;
        let s = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3;
        writer
            .write_sample((s * i16::MAX as f32) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

fn unit(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
}

fn catalog(dim: usize) -> Catalog {
    let json = serde_json::json!({
        "categories": [
            {"id": "dog", "label": "Dog", "description": "Dog barking"},
            {"id": "doorbell", "label": "Doorbell", "description": "Someone at the door"},
            {"id": "alarm", "label": "Alarm", "description": "Smoke alarm"},
            {"id": "speech", "label": "Speech", "description": "Someone talking"}
        ],
        "embeddings": [unit(dim, 0), unit(dim, 1), unit(dim, 2), unit(dim, 3)]
    });
    Catalog::from_json_str(&json.to_string()).expect("catalog")
}

fn dummy_pipeline(cfg: PipelineConfig) -> Pipeline<Box<dyn InferenceBackend>> {
    let caption = CaptionTokenizer::from_json_str(CAPTION_VOCAB).expect("caption vocab");
    let text = TextTokenizer::from_vocabulary(
        Vocabulary::from_tokenizer_json(TEXT_VOCAB, VocabFamily::ByteLevel).expect("text vocab"),
        cfg.max_text_len,
    )
    .expect("text tokenizer");
    let backend: Box<dyn InferenceBackend> = Box::new(
        DummyBackend::new(
            caption.vocab_size(),
            caption.specials().eos,
            cfg.embedding_dim,
            cfg.sample_rate,
        )
        .expect("dummy backend"),
    );
    let catalog = Arc::new(catalog(cfg.embedding_dim));
    Pipeline::new(backend, caption, text, catalog, cfg).expect("pipeline")
}

#[test]
fn batch_over_wav_files_reports_every_clip() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_tone(&dir.path().join("one.wav"), 1.0, 16_000);
    write_tone(&dir.path().join("two.wav"), 2.0, 44_100);
    std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

    let pipeline = dummy_pipeline(PipelineConfig::default());
    let rows = pipeline
        .infer_paths(vec![dir.path().to_path_buf()])
        .expect("batch");

    assert_eq!(rows.len(), 2);
    let names: Vec<PathBuf> = rows.iter().map(|r| PathBuf::from(r.file.file_name().unwrap())).collect();
    assert_eq!(names, vec![PathBuf::from("one.wav"), PathBuf::from("two.wav")]);
    for row in &rows {
        assert!(row.error.is_none(), "unexpected error: {:?}", row.error);
        assert_eq!(row.model, "dummy");
        assert_eq!(row.stop_reason, Some(StopReason::EndOfSequence));
        assert_eq!(row.token_ids.first(), Some(&1));
        assert_eq!(row.token_ids.last(), Some(&2));
        assert!(row.token_ids.len() <= 31);
        assert_eq!(row.matches.len(), 3);
        for pair in row.matches.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

#[test]
fn same_clip_gives_same_output() {
    let pipeline = dummy_pipeline(PipelineConfig::default());
    let clip: Vec<f32> = (0..80_000).map(|i| ((i as f32) * 0.01).sin() * 0.2).collect();
    let first = pipeline.run(&clip).expect("run");
    let second = pipeline.run(&clip).expect("run");
    assert_eq!(first, second);
    assert!(!first.caption.is_empty());
}

#[test]
fn zero_step_budget_yields_empty_caption() {
    let cfg = PipelineConfig {
        max_steps: 0,
        ..PipelineConfig::default()
    };
    let pipeline = dummy_pipeline(cfg);
    let out = pipeline.run(&vec![0.1; 80_000]).expect("run");
    assert_eq!(out.token_ids, vec![1]);
    assert_eq!(out.stop_reason, StopReason::StepLimit);
    assert_eq!(out.caption, "");
}

#[test]
fn clip_too_short_for_encoder_fails_the_request() {
    let pipeline = dummy_pipeline(PipelineConfig::default());
    assert!(pipeline.run(&[0.0; 100]).is_err());
}

#[test]
fn embedding_is_unit_length_and_truncated() {
    let cfg = PipelineConfig {
        embedding_dim: 32,
        ..PipelineConfig::default()
    };
    let pipeline = dummy_pipeline(cfg);
    let e: Embedding = pipeline.embed("a dog barks").expect("embed");
    assert_eq!(e.len(), 32);
    let norm: f32 = e.as_slice().iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn word_piece_vocab_txt_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vocab.txt");
    let mut lines = vec!["[PAD]".to_string()];
    lines.extend((1..100).map(|i| format!("[unused{i}]")));
    lines.extend(["[UNK]", "[CLS]", "[SEP]", "dog", "bark", "##s", "."].map(String::from));
    std::fs::write(&path, lines.join("\n")).expect("write vocab");

    let tok = TextTokenizer::from_path(&path, TextTokenizerKind::WordPiece, 16).expect("tokenizer");
    let enc = tok.encode("Dog barks.");
    assert_eq!(&enc.ids[..6], &[101, 103, 104, 105, 106, 102]);
    assert_eq!(enc.type_ids, Some(vec![0; 16]));
    assert_eq!(tok.decode(&enc.ids), "dog bark ##s .");
}
