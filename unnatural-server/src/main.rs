use std::io;
use std::path::PathBuf;

use actix_cors::Cors;
use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{delete, get, middleware, post, route, web, App, HttpResponse, HttpServer, ResponseError};
use clap::Parser;
use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use unnatural_core::model::multigram_model::DEFAULT_ORDER;
use unnatural_core::{CorpusManager, Error, ManagerConfig, PredictionCandidate, Token};

/// Command line (and environment) configuration of the server.
#[derive(Parser, Debug)]
#[command(name = "unnatural-server", about = "HTTP interface to corpus language models")]
struct Cli {
	/// Address to bind.
	#[arg(long, env = "UNNATURAL_HOST", default_value = "127.0.0.1")]
	host: String,

	/// Port to bind.
	#[arg(long, env = "UNNATURAL_PORT", default_value_t = 5000)]
	port: u16,

	/// Directory holding the persisted corpora.
	#[arg(long, env = "UNNATURAL_STORAGE", default_value = "./corpora")]
	storage: PathBuf,

	/// Model order of newly created corpora.
	#[arg(long, env = "UNNATURAL_ORDER", default_value_t = DEFAULT_ORDER)]
	order: usize,

	/// Restrict the server to these corpus names (repeatable). Any valid name otherwise.
	#[arg(long = "corpus")]
	corpora: Vec<String>,

	/// Number of HTTP workers (defaults to the number of CPUs).
	#[arg(long)]
	workers: Option<usize>,

	/// Default number of suggestions returned by predict.
	#[arg(long, default_value_t = 10)]
	limit: usize,
}

impl Cli {
	fn manager_config(&self) -> ManagerConfig {
		ManagerConfig {
			storage_root: self.storage.clone(),
			order: self.order,
			known_corpora: (!self.corpora.is_empty()).then(|| self.corpora.iter().cloned().collect()),
		}
	}
}

struct SharedData {
	manager: CorpusManager,
	default_limit: usize,
}

/// Text content of a request: the `s` query parameter, otherwise the body.
#[derive(Deserialize)]
struct ContentQuery {
	s: Option<String>,
	limit: Option<usize>,
}

#[derive(Serialize)]
struct Suggestions {
	suggestions: Vec<PredictionCandidate>,
}

#[derive(Serialize)]
struct CrossEntropy {
	cross_entropy: f64,
}

#[derive(Serialize)]
struct Trained {
	tokens: usize,
}

#[derive(Serialize)]
struct Tokens {
	tokens: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody {
	error: String,
}

/// Maps core errors onto HTTP responses.
#[derive(Debug, Error)]
enum ApiError {
	#[error(transparent)]
	Core(#[from] Error),

	#[error("request body is not valid UTF-8")]
	InvalidBody,

	#[error("worker pool unavailable")]
	Blocking(#[from] BlockingError),
}

impl ResponseError for ApiError {
	fn status_code(&self) -> StatusCode {
		match self {
			ApiError::Core(Error::CorpusNotFound { .. }) => StatusCode::NOT_FOUND,
			ApiError::Core(e) if e.is_bad_input() => StatusCode::BAD_REQUEST,
			ApiError::InvalidBody => StatusCode::BAD_REQUEST,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn error_response(&self) -> HttpResponse {
		if self.status_code().is_server_error() {
			error!("{self}");
		}
		HttpResponse::build(self.status_code()).json(ErrorBody { error: self.to_string() })
	}
}

impl ContentQuery {
	fn content(&self, body: &web::Bytes) -> Result<String, ApiError> {
		match &self.s {
			Some(s) => Ok(s.clone()),
			None => String::from_utf8(body.to_vec()).map_err(|_| ApiError::InvalidBody),
		}
	}
}

/// Splits a `/`-separated token path into tokens.
///
/// Tokens containing `/` cannot be expressed this way; POST the text instead.
fn parse_tokens(path: &str) -> Vec<Token> {
	path.split('/').filter(|s| !s.is_empty()).map(Token::from_surface).collect()
}

/// Runs a manager call on the blocking pool.
///
/// Any call may read a corpus from disk on first access, and training
/// writes it, so none of them run on the async workers.
async fn run<R, F>(data: &web::Data<SharedData>, f: F) -> Result<R, ApiError>
where
	R: Send + 'static,
	F: FnOnce(&SharedData) -> Result<R, Error> + Send + 'static,
{
	let shared = data.clone();
	Ok(web::block(move || f(shared.get_ref())).await??)
}

/// GET /{corpus}/
///
/// Summary of the corpus.
#[get("/{corpus}/")]
async fn corpus_info(data: web::Data<SharedData>, corpus: web::Path<String>) -> Result<HttpResponse, ApiError> {
	let name = corpus.into_inner();
	let summary = run(&data, move |shared| shared.manager.summary(&name)).await?;
	Ok(HttpResponse::Ok().json(summary))
}

/// POST /{corpus}/
///
/// Trains the corpus on the uploaded text. Answers once the update is stored.
#[post("/{corpus}/")]
async fn train(
	data: web::Data<SharedData>,
	corpus: web::Path<String>,
	query: web::Query<ContentQuery>,
	body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
	let text = query.content(&body)?;
	let name = corpus.into_inner();
	let tokens = run(&data, move |shared| shared.manager.train(&name, &text)).await?;
	Ok(HttpResponse::Accepted().json(Trained { tokens }))
}

/// DELETE /{corpus}/
///
/// Soft-deletes the corpus; its artifact is kept as a backup.
#[delete("/{corpus}/")]
async fn delete_corpus(data: web::Data<SharedData>, corpus: web::Path<String>) -> Result<HttpResponse, ApiError> {
	let name = corpus.into_inner();
	run(&data, move |shared| shared.manager.delete(&name)).await?;
	Ok(HttpResponse::NoContent().finish())
}

/// GET /{corpus}/predict/{tokens*}
///
/// Suggestions after a `/`-separated token prefix.
#[get("/{corpus}/predict/{tokens:.*}")]
async fn predict_tokens(
	data: web::Data<SharedData>,
	path: web::Path<(String, String)>,
	query: web::Query<ContentQuery>,
) -> Result<HttpResponse, ApiError> {
	let (name, token_str) = path.into_inner();
	let limit = query.limit.unwrap_or(data.default_limit);
	let prefix = parse_tokens(&token_str);
	let suggestions = run(&data, move |shared| shared.manager.predict(&name, &prefix, limit)).await?;
	Ok(HttpResponse::Ok().json(Suggestions { suggestions }))
}

/// POST /{corpus}/predict/
///
/// Suggestions after the uploaded text, which ends at the cursor.
#[post("/{corpus}/predict/")]
async fn predict_text(
	data: web::Data<SharedData>,
	corpus: web::Path<String>,
	query: web::Query<ContentQuery>,
	body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
	let text = query.content(&body)?;
	let limit = query.limit.unwrap_or(data.default_limit);
	let name = corpus.into_inner();
	let suggestions = run(&data, move |shared| shared.manager.predict_text(&name, &text, limit)).await?;
	Ok(HttpResponse::Ok().json(Suggestions { suggestions }))
}

async fn score(
	data: web::Data<SharedData>,
	corpus: web::Path<String>,
	query: web::Query<ContentQuery>,
	body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
	let text = query.content(&body)?;
	let name = corpus.into_inner();
	let value = run(&data, move |shared| shared.manager.score(&name, &text)).await?;
	Ok(HttpResponse::Ok().json(CrossEntropy { cross_entropy: value }))
}

/// GET|POST /{corpus}/xentropy
///
/// Cross-entropy of the uploaded file with respect to the corpus.
#[route("/{corpus}/xentropy", method = "GET", method = "POST")]
async fn xentropy(
	data: web::Data<SharedData>,
	corpus: web::Path<String>,
	query: web::Query<ContentQuery>,
	body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
	score(data, corpus, query, body).await
}

/// GET /{corpus}/cross-entropy
#[get("/{corpus}/cross-entropy")]
async fn cross_entropy(
	data: web::Data<SharedData>,
	corpus: web::Path<String>,
	query: web::Query<ContentQuery>,
	body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
	score(data, corpus, query, body).await
}

/// GET|POST /{corpus}/tokenize
///
/// Tokenizes the given text as a complete snippet.
#[route("/{corpus}/tokenize", method = "GET", method = "POST")]
async fn tokenize(
	data: web::Data<SharedData>,
	corpus: web::Path<String>,
	query: web::Query<ContentQuery>,
	body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
	let text = query.content(&body)?;
	let name = corpus.into_inner();
	let tokens = run(&data, move |shared| shared.manager.tokenize(&name, &text, false)).await?;
	let tokens = tokens.iter().map(|t| t.surface().to_owned()).collect();
	Ok(HttpResponse::Ok().json(Tokens { tokens }))
}

fn routes(cfg: &mut web::ServiceConfig) {
	cfg.service(corpus_info)
		.service(train)
		.service(delete_corpus)
		.service(predict_tokens)
		.service(predict_text)
		.service(xentropy)
		.service(cross_entropy)
		.service(tokenize);
}

/// Main entry point for the server.
///
/// Builds the corpus manager from the command line, serves the routes with
/// permissive CORS, and flushes every corpus once the server stops.
#[actix_web::main]
async fn main() -> io::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let cli = Cli::parse();

	let manager = CorpusManager::new(cli.manager_config()).map_err(io::Error::other)?;
	let shared_data = web::Data::new(SharedData { manager, default_limit: cli.limit });
	let app_data = shared_data.clone();

	info!("Listening on {}:{}", cli.host, cli.port);
	HttpServer::new(move || {
		App::new()
			.app_data(app_data.clone())
			.wrap(Cors::permissive())
			.wrap(middleware::Logger::default())
			.configure(routes)
	})
		.workers(cli.workers.unwrap_or_else(num_cpus::get))
		.bind((cli.host.as_str(), cli.port))?
		.run()
		.await?;

	match shared_data.manager.flush_all() {
		Ok(flushed) => info!("Flushed {flushed} corpora on shutdown"),
		Err(e) => error!("Flush on shutdown failed: {e}"),
	}
	Ok(())
}
