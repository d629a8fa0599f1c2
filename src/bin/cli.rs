use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clips")]
#[command(about = "A CLI tool for sharing video clips", long_about = None)]
struct Cli {
    #[arg(long, default_value = "http://localhost:3000", help = "Base URL of the clip service")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new user account")]
    Signup {
        #[arg(short, long, help = "Username")]
        username: String,

        #[arg(short, long, help = "Password")]
        password: String,
    },

    #[command(about = "Check your credentials")]
    Login {
        #[arg(short, long, help = "Username")]
        username: String,

        #[arg(short, long, help = "Password")]
        password: String,
    },

    #[command(about = "List all clips")]
    List,

    #[command(about = "Upload a video clip")]
    Upload {
        #[arg(short, long, help = "Path to the video file")]
        file: PathBuf,

        #[arg(short, long, help = "Clip title")]
        title: String,

        #[arg(short, long, default_value = "", help = "Clip category")]
        category: String,

        #[arg(long, default_value = "", help = "Tags (comma-separated)")]
        tags: String,

        #[arg(short, long, help = "Uploader username")]
        uploader: String,
    },

    #[command(about = "Record a view on a clip")]
    View {
        #[arg(help = "Clip ID")]
        id: String,
    },

    #[command(about = "Like a clip, or remove your like")]
    Like {
        #[arg(help = "Clip ID")]
        id: String,

        #[arg(short, long, help = "Your username")]
        username: String,
    },

    #[command(about = "Delete a clip")]
    Delete {
        #[arg(help = "Clip ID")]
        id: String,
    },
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct InteractRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct InteractResponse {
    views: u64,
    likes: usize,
}

#[derive(Debug, Deserialize)]
struct Clip {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    uploader: String,
    #[serde(rename = "videoURL", default)]
    video_url: String,
    #[serde(default)]
    views: u64,
    #[serde(default)]
    likes: Vec<String>,
}

struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            bail!("{} ({})", message, status);
        }

        response.json().await.context("Unexpected response body")
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Self::parse(response).await
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api_url);

    if let Err(e) = run_command(&client, cli.command).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_command(client: &ApiClient, command: Commands) -> Result<()> {
    match command {
        Commands::Signup { username, password } => {
            let result: MessageResponse = client
                .post_json("/signup", &Credentials { username: &username, password: &password })
                .await?;
            println!("✅ {}", result.message);
            println!("👤 Username: {}", username);
        }
        Commands::Login { username, password } => {
            let result: MessageResponse = client
                .post_json("/login", &Credentials { username: &username, password: &password })
                .await?;
            println!("✅ {}", result.message);
            println!("👤 Welcome back, {}!", username);
        }
        Commands::List => list_clips(client).await?,
        Commands::Upload {
            file,
            title,
            category,
            tags,
            uploader,
        } => upload_clip(client, file, title, category, tags, uploader).await?,
        Commands::View { id } => {
            let counts = interact(client, &id, "view", None).await?;
            println!("👀 Views: {}  ❤️  Likes: {}", counts.views, counts.likes);
        }
        Commands::Like { id, username } => {
            let counts = interact(client, &id, "like", Some(&username)).await?;
            println!("❤️  Likes: {}  👀 Views: {}", counts.likes, counts.views);
        }
        Commands::Delete { id } => {
            let response = client.http.delete(client.url(&format!("/clips/{}", id))).send().await?;
            let result: MessageResponse = ApiClient::parse(response).await?;
            println!("🗑️  {} ({})", result.message, id);
        }
    }

    Ok(())
}

async fn interact(
    client: &ApiClient,
    id: &str,
    kind: &str,
    username: Option<&str>,
) -> Result<InteractResponse> {
    client
        .post_json(&format!("/clips/{}/interact", id), &InteractRequest { kind, username })
        .await
}

async fn list_clips(client: &ApiClient) -> Result<()> {
    let response = client.http.get(client.url("/clips")).send().await?;
    let clips: Vec<Clip> = ApiClient::parse(response).await?;

    if clips.is_empty() {
        println!("📭 No clips found.");
        return Ok(());
    }

    println!("\n🎬 Clips ({})\n", clips.len());

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("Title"),
        Cell::new("Category"),
        Cell::new("Uploader"),
        Cell::new("Views"),
        Cell::new("Likes"),
    ]));

    for clip in clips {
        table.add_row(Row::new(vec![
            Cell::new(&clip.id),
            Cell::new(&clip.title),
            Cell::new(&clip.category),
            Cell::new(&clip.uploader),
            Cell::new(&clip.views.to_string()),
            Cell::new(&clip.likes.len().to_string()),
        ]));
    }

    table.printstd();
    println!();

    Ok(())
}

async fn upload_clip(
    client: &ApiClient,
    file: PathBuf,
    title: String,
    category: String,
    tags: String,
    uploader: String,
) -> Result<()> {
    if !file.is_file() {
        bail!("File not found: {}", file.display());
    }

    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("clip")
        .to_string();
    let size_kb = bytes.len() as f64 / 1024.0;

    let form = Form::new()
        .text("title", title)
        .text("category", category)
        .text("tags", tags)
        .text("uploader", uploader)
        .part("clip", Part::bytes(bytes).file_name(file_name.clone()));

    let response = client
        .http
        .post(client.url("/clips"))
        .multipart(form)
        .send()
        .await?;
    let clip: Clip = ApiClient::parse(response).await?;

    println!("✅ Clip uploaded successfully!");
    println!("   Title: {}", clip.title);
    println!("   File: {} ({:.2} KB)", file_name, size_kb);
    println!("   ID: {}", clip.id);
    println!("   URL: {}", clip.video_url);

    Ok(())
}
