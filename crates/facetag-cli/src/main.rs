use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

// D-Bus proxy for facetagd; `#[zbus::proxy]` generates `FaceTagProxy`.
#[zbus::proxy(
    interface = "io.facetag.FaceTag1",
    default_service = "io.facetag.FaceTag1",
    default_path = "/io/facetag/FaceTag1"
)]
trait FaceTag {
    async fn detect_faces(&self, image_url: &str, provider: &str) -> zbus::Result<String>;
    async fn recognize(&self, image_url: &str, provider: &str, min_confidence: f64) -> zbus::Result<String>;
    async fn add_person(&self, name: &str, category: &str) -> zbus::Result<String>;
    async fn update_person(&self, id: &str, update_json: &str) -> zbus::Result<String>;
    async fn get_person(&self, id: &str) -> zbus::Result<String>;
    async fn list_persons(&self) -> zbus::Result<String>;
    async fn search_persons(&self, query: &str) -> zbus::Result<String>;
    async fn confirm_face(
        &self,
        person_id: &str,
        image_url: &str,
        provider: &str,
        face_index: u32,
    ) -> zbus::Result<String>;
    async fn remove_face(&self, person_id: &str, face_id: &str) -> zbus::Result<bool>;
    async fn merge_persons(&self, target_id: &str, source_id: &str) -> zbus::Result<String>;
    async fn delete_person(&self, id: &str) -> zbus::Result<bool>;
    async fn train(&self, id: &str) -> zbus::Result<bool>;
    async fn record_download(&self, record_json: &str) -> zbus::Result<bool>;
    async fn list_downloads(&self, user_id: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facetag", about = "facetag face tagging CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in an image
    Detect {
        image_url: String,
        /// Detection provider (local, aws, azure, google)
        #[arg(short, long, default_value = "")]
        provider: String,
    },
    /// Detect faces and match them against known persons
    Recognize {
        image_url: String,
        #[arg(short, long, default_value = "")]
        provider: String,
        /// Minimum confidence in percent (daemon default if omitted)
        #[arg(short, long)]
        min_confidence: Option<f64>,
    },
    /// Manage known persons
    #[command(subcommand)]
    Person(PersonCommand),
    /// Record and list image downloads
    #[command(subcommand)]
    Downloads(DownloadsCommand),
    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum PersonCommand {
    /// Add a new person
    Add {
        name: String,
        /// model, celebrity, public_figure, photographer or other
        #[arg(short, long, default_value = "other")]
        category: String,
    },
    /// List all persons
    List,
    /// Show one person
    Show { id: String },
    /// Search names and aliases
    Search { query: String },
    /// Update name, aliases, category or verification
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// Replace aliases (repeatable)
        #[arg(long = "alias")]
        aliases: Vec<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        verified: Option<bool>,
    },
    /// Attach a detected face from an image to a person
    Confirm {
        person_id: String,
        image_url: String,
        #[arg(short, long, default_value = "")]
        provider: String,
        /// Index of the face in the detection result
        #[arg(short, long, default_value_t = 0)]
        face: u32,
    },
    /// Remove a confirmed face from a person
    RemoveFace { person_id: String, face_id: String },
    /// Merge SOURCE into TARGET
    Merge { target: String, source: String },
    /// Delete a person
    Delete { id: String },
    /// Start a training run
    Train { id: String },
}

#[derive(Subcommand)]
enum DownloadsCommand {
    /// Record a download
    Record {
        #[arg(long)]
        user: String,
        #[arg(long)]
        image: String,
        /// standard, extended or editorial
        #[arg(long, default_value = "standard")]
        license: String,
        #[arg(long, default_value = "original")]
        resolution: String,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "")]
        title: String,
    },
    /// List a user's downloads, newest first
    List { user: String },
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn update_json(
    name: Option<String>,
    aliases: Vec<String>,
    category: Option<String>,
    verified: Option<bool>,
) -> serde_json::Value {
    let mut update = serde_json::Map::new();
    if let Some(name) = name {
        update.insert("name".into(), name.into());
    }
    if !aliases.is_empty() {
        update.insert("aliases".into(), aliases.into());
    }
    if let Some(category) = category {
        update.insert("category".into(), category.to_lowercase().replace('-', "_").into());
    }
    if let Some(verified) = verified {
        update.insert("verified".into(), verified.into());
    }
    serde_json::Value::Object(update)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = FaceTagProxy::new(&conn)
        .await
        .context("facetagd is not reachable")?;
    tracing::debug!(system = cli.system, "connected to facetagd");

    match cli.command {
        Commands::Detect { image_url, provider } => {
            print_json(&proxy.detect_faces(&image_url, &provider).await?)?;
        }
        Commands::Recognize {
            image_url,
            provider,
            min_confidence,
        } => {
            let min_confidence = min_confidence.unwrap_or(-1.0);
            print_json(&proxy.recognize(&image_url, &provider, min_confidence).await?)?;
        }
        Commands::Person(cmd) => match cmd {
            PersonCommand::Add { name, category } => {
                print_json(&proxy.add_person(&name, &category).await?)?;
            }
            PersonCommand::List => print_json(&proxy.list_persons().await?)?,
            PersonCommand::Show { id } => print_json(&proxy.get_person(&id).await?)?,
            PersonCommand::Search { query } => print_json(&proxy.search_persons(&query).await?)?,
            PersonCommand::Update {
                id,
                name,
                aliases,
                category,
                verified,
            } => {
                let update = update_json(name, aliases, category, verified);
                print_json(&proxy.update_person(&id, &update.to_string()).await?)?;
            }
            PersonCommand::Confirm {
                person_id,
                image_url,
                provider,
                face,
            } => {
                print_json(&proxy.confirm_face(&person_id, &image_url, &provider, face).await?)?;
            }
            PersonCommand::RemoveFace { person_id, face_id } => {
                proxy.remove_face(&person_id, &face_id).await?;
                println!("Removed face {face_id}");
            }
            PersonCommand::Merge { target, source } => {
                print_json(&proxy.merge_persons(&target, &source).await?)?;
            }
            PersonCommand::Delete { id } => {
                proxy.delete_person(&id).await?;
                println!("Deleted person {id}");
            }
            PersonCommand::Train { id } => {
                proxy.train(&id).await?;
                println!("Training started for {id}");
            }
        },
        Commands::Downloads(cmd) => match cmd {
            DownloadsCommand::Record {
                user,
                image,
                license,
                resolution,
                price,
                title,
            } => {
                let record = serde_json::json!({
                    "user_id": user,
                    "image_id": image,
                    "license_type": license.to_lowercase(),
                    "resolution": resolution,
                    "price_paid": price,
                    "download_date": chrono::Utc::now().to_rfc3339(),
                    "image_title": title,
                });
                proxy.record_download(&record.to_string()).await?;
                println!("Recorded download of {image} for {user}");
            }
            DownloadsCommand::List { user } => print_json(&proxy.list_downloads(&user).await?)?,
        },
        Commands::Status => print_json(&proxy.status().await?)?,
    }

    Ok(())
}
