use crate::EmbedderArgs;
use anyhow::Result;
use clap::Args;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tomo_retrieval::{
    Corpus, GeneratorConfig, OpenAiEmbedder, OpenAiGenerator, Retrieval, Retriever, RetrieverConfig,
};
use tomo_vector::BackendPreference;

/// Longest fragment printed per result, in characters.
const FRAGMENT_CHARS: usize = 1500;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Embedded corpus produced by `tomo embed`
    #[arg(long, env = "TOMO_CORPUS")]
    pub corpus: PathBuf,

    /// Question to ask; starts an interactive session when omitted
    #[arg(long)]
    pub question: Option<String>,

    /// Passages to retrieve per question
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,

    /// Minimum best score for results to be shown
    #[arg(long, default_value_t = 0.60)]
    pub threshold: f32,

    /// Search backend: auto, accelerated or brute_force
    #[arg(long, env = "TOMO_BACKEND", default_value = "auto")]
    pub backend: BackendPreference,

    /// Chat model for generated answers; passages only when unset
    #[arg(long, env = "TOMO_GENERATOR_MODEL")]
    pub generator_model: Option<String>,

    #[command(flatten)]
    pub embedder: EmbedderArgs,
}

pub fn run(args: AskArgs) -> Result<()> {
    let config = RetrieverConfig {
        top_k: args.top_k,
        threshold: args.threshold,
        ..RetrieverConfig::default()
    };
    config.validate()?;

    let embedder_config = args.embedder.config();
    let corpus = Corpus::load(&args.corpus)?;
    let embedder = OpenAiEmbedder::from_config(&embedder_config)?;
    let mut retriever =
        Retriever::from_corpus(corpus, args.backend, Box::new(embedder))?.with_config(config);

    if let Some(model) = &args.generator_model {
        let generator_config = GeneratorConfig {
            base_url: embedder_config.base_url.clone(),
            ..GeneratorConfig::new(model.clone())
        };
        retriever = retriever.with_generator(Box::new(OpenAiGenerator::from_config(
            &generator_config,
        )?));
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match &args.question {
        Some(question) => ask_once(&retriever, question, &mut out),
        None => interactive(&retriever, std::io::stdin().lock(), &mut out),
    }
}

/// Read questions line by line until `exit`, `quit` or end of input.
fn interactive(retriever: &Retriever, input: impl BufRead, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "{} chunks loaded. Type a question, or 'exit' to quit.",
        retriever.len()
    )?;

    let mut lines = input.lines();
    loop {
        write!(out, "\nQuestion> ")?;
        out.flush()?;

        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let question = line?;
        let question = question.trim();

        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        // A failed question should not end the session
        if let Err(e) = ask_once(retriever, question, out) {
            tracing::error!("{:#}", e);
            writeln!(out, "Error: {:#}", e)?;
        }
    }
    Ok(())
}

fn ask_once(retriever: &Retriever, question: &str, out: &mut impl Write) -> Result<()> {
    if retriever.has_generator() {
        let answer = retriever.answer(question)?;
        if answer.no_relevant_result {
            return print_no_result(answer.best_score, out);
        }
        print_passages(&answer.passages, out)?;
        match (&answer.answer, &answer.generation_error) {
            (Some(text), _) => writeln!(out, "\nAnswer:\n{}", text)?,
            (None, Some(err)) => writeln!(out, "\n{}", err)?,
            (None, None) => {}
        }
        return Ok(());
    }

    match retriever.retrieve(question, retriever.config().top_k)? {
        Retrieval::Relevant(passages) => print_passages(&passages, out),
        Retrieval::NoRelevantResult { best_score } => print_no_result(best_score, out),
    }
}

fn print_passages(passages: &[tomo_retrieval::RetrievedPassage], out: &mut impl Write) -> Result<()> {
    for (rank, passage) in passages.iter().enumerate() {
        writeln!(out, "\n[{}] Source: {}", rank + 1, passage.source)?;
        writeln!(out, "Fragment: {}", truncate_chars(&passage.text, FRAGMENT_CHARS))?;
        writeln!(out, "Score: {:.4}", passage.score)?;
    }
    Ok(())
}

fn print_no_result(best_score: Option<f32>, out: &mut impl Write) -> Result<()> {
    match best_score {
        Some(score) => writeln!(
            out,
            "No relevant information found (best score {:.4}).",
            score
        )?,
        None => writeln!(out, "No relevant information found.")?,
    }
    Ok(())
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
