//! os-cloud-config
//!
//! Command-line entry point. Each subcommand is one bootstrap step of a fresh
//! OpenStack cloud; credentials for the steps that talk to a running cloud
//! come from the `OS_*` environment variables.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use os_cloud_config::config::{root_disk_from_env, Credentials};
use os_cloud_config::flavors;
use os_cloud_config::glance::create_or_find_kernel_and_ramdisk;
use os_cloud_config::keystone::{self, EndpointOverrides, InitializeOptions, KeystoneEndpointOptions};
use os_cloud_config::neutron::{initialize_neutron, NetworkDescription};
use os_cloud_config::nodes::register::populate_deploy_images;
use os_cloud_config::nodes::{load_nodes, register_all_nodes, register_all_nova_bm_nodes, RegisterOptions};
use os_cloud_config::openstack::{KeystoneAdminClient, Session};
use os_cloud_config::{pki, Error, RetryPolicy, ServiceDirectory, REGISTER_RETRY};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Bootstrap an OpenStack cloud: nodes, flavors, Keystone, Neutron and PKI
#[derive(Parser, Debug)]
#[command(name = "os-cloud-config", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LoggingArgs {
    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error); overrides --debug
    #[arg(long, env = "LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register (or update) bare-metal nodes described in a JSON file
    RegisterNodes(RegisterNodesArgs),

    /// Create flavors describing the compute resources the cloud has available
    SetupFlavors(SetupFlavorsArgs),

    /// Upload a deploy kernel and ramdisk to Glance
    UploadKernelRamdisk(UploadKernelRamdiskArgs),

    /// Perform post-deployment initialization of Keystone
    InitKeystone(InitKeystoneArgs),

    /// Register users, services and endpoints in Keystone
    SetupEndpoints(SetupEndpointsArgs),

    /// Create the Neutron networks described in a JSON file
    SetupNeutron(SetupNeutronArgs),

    /// Generate the Keystone CA and token-signing pair
    ///
    /// Keys are ECDSA P-256, not RSA.
    GenerateKeystonePki(GenerateKeystonePkiArgs),

    /// Generate a certificate signed by the CA of a Heat environment
    ///
    /// Keys are ECDSA P-256, not RSA.
    GenerateSslCert(GenerateSslCertArgs),

    /// Generate a self-signed CA and signing pair into a directory
    ///
    /// Writes ca_key.pem, ca_cert.pem, signing_key.pem and signing_cert.pem,
    /// readable by the owner only.
    ///
    /// Keys are ECDSA P-256, not RSA.
    GenerateSslCa(GenerateSslCaArgs),
}

#[derive(Args, Debug)]
struct RegisterNodesArgs {
    /// Nova-bm service host to register nodes with (legacy path only)
    #[arg(short = 's', long)]
    service_host: Option<String>,

    /// A JSON file containing a list of nodes that are intended to be registered
    #[arg(short = 'n', long)]
    nodes: PathBuf,

    /// Name of the deploy kernel registered in Glance
    #[arg(long)]
    kernel_name: Option<String>,

    /// Name of the deploy ramdisk registered in Glance
    #[arg(long)]
    ramdisk_name: Option<String>,

    /// Delete registered nodes that are not in the nodes file
    #[arg(long)]
    remove: bool,

    /// Skip power credential validation after registration
    #[arg(long)]
    no_validate: bool,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["nodes", "flavors", "from_ironic"])))]
struct SetupFlavorsArgs {
    /// A JSON file containing a list of nodes that distinct flavors will be
    /// generated and created from
    #[arg(short = 'n', long)]
    nodes: Option<PathBuf>,

    /// A JSON file containing a list of flavors to create directly
    #[arg(short = 'f', long)]
    flavors: Option<PathBuf>,

    /// Generate flavors from the nodes registered in Ironic
    #[arg(short = 'i', long)]
    from_ironic: bool,

    /// ID of the kernel in Glance
    #[arg(short = 'k', long, required_unless_present = "kernel_name")]
    kernel: Option<String>,

    /// Name of the kernel registered in Glance; wins over --kernel
    #[arg(long)]
    kernel_name: Option<String>,

    /// ID of the ramdisk in Glance
    #[arg(short = 'r', long, required_unless_present = "ramdisk_name")]
    ramdisk: Option<String>,

    /// Name of the ramdisk registered in Glance; wins over --ramdisk
    #[arg(long)]
    ramdisk_name: Option<String>,
}

#[derive(Args, Debug)]
struct UploadKernelRamdiskArgs {
    /// Name of the kernel image
    #[arg(short = 'k', long)]
    kernel: String,

    /// Kernel to upload
    #[arg(short = 'l', long)]
    kernel_file: PathBuf,

    /// Name of the ramdisk image
    #[arg(short = 'r', long)]
    ramdisk: String,

    /// Ramdisk to upload
    #[arg(short = 's', long)]
    ramdisk_file: PathBuf,
}

#[derive(Args, Debug)]
struct InitKeystoneArgs {
    /// IP or hostname of the Keystone host
    #[arg(short = 'o', long)]
    host: String,

    /// Admin token set in the Keystone configuration
    #[arg(short = 't', long)]
    admin_token: String,

    /// Email address of the admin user
    #[arg(short = 'e', long)]
    admin_email: String,

    /// Password of the admin user
    #[arg(short = 'p', long)]
    admin_password: String,

    /// Region the identity endpoint belongs to
    #[arg(short = 'r', long, default_value = keystone::DEFAULT_REGION)]
    region: String,

    /// Host to serve the public endpoint over HTTPS
    #[arg(short = 's', long)]
    ssl: Option<String>,

    /// Host to serve the public endpoint over plain HTTP
    #[arg(short = 'u', long)]
    public: Option<String>,

    /// Host of the admin endpoint
    #[arg(short = 'a', long)]
    admin: Option<String>,

    /// Host of the internal endpoint
    #[arg(short = 'i', long)]
    internal: Option<String>,

    /// Port of the public endpoint
    #[arg(long)]
    public_port: Option<u16>,

    /// Port of the admin endpoint
    #[arg(long)]
    admin_port: Option<u16>,

    /// Port of the internal endpoint
    #[arg(long)]
    internal_port: Option<u16>,

    /// Seconds to wait for Keystone to answer
    #[arg(long, default_value_t = 600)]
    timeout: u64,

    /// Seconds between attempts while waiting for Keystone
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,
}

#[derive(Args, Debug)]
struct SetupEndpointsArgs {
    /// A JSON file mapping service names to endpoint overrides
    #[arg(short = 's', long)]
    services: PathBuf,

    /// Public host; switches public endpoints to HTTPS
    #[arg(short = 'p', long)]
    public: Option<String>,

    /// Region the endpoints belong to
    #[arg(short = 'r', long)]
    region: Option<String>,
}

#[derive(Args, Debug)]
struct SetupNeutronArgs {
    /// A JSON file describing the networks to create
    #[arg(short = 'n', long)]
    network_json: PathBuf,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["directory", "heatenv"])))]
struct GenerateKeystonePkiArgs {
    /// Directory where the keys and certificates are written
    directory: Option<PathBuf>,

    /// JSON environment file the keys and certificates are merged into
    #[arg(short = 'j', long)]
    heatenv: Option<PathBuf>,

    /// Use the seed layout for the environment file
    #[arg(short = 's', long, requires = "heatenv")]
    seed: bool,
}

#[derive(Args, Debug)]
struct GenerateSslCertArgs {
    /// Path to the JSON Heat environment file
    heat_env: PathBuf,

    /// Name of the key/certificate pair
    name: String,

    /// Replace an existing certificate of the same name
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args, Debug)]
struct GenerateSslCaArgs {
    /// Directory where the keys and certificates are written
    directory: PathBuf,

    /// Overwrite existing certificate files
    #[arg(long)]
    overwrite: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli.logging);
    debug!(version = os_cloud_config::VERSION, "Starting");

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Unexpected error during command execution: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::RegisterNodes(args) => register_nodes(args).await,
        Command::SetupFlavors(args) => setup_flavors(args).await,
        Command::UploadKernelRamdisk(args) => upload_kernel_ramdisk(args).await,
        Command::InitKeystone(args) => init_keystone(args).await,
        Command::SetupEndpoints(args) => setup_endpoints(args).await,
        Command::SetupNeutron(args) => setup_neutron(args).await,
        Command::GenerateKeystonePki(args) => generate_keystone_pki(args),
        Command::GenerateSslCert(args) => generate_ssl_cert(args),
        Command::GenerateSslCa(args) => generate_ssl_ca(args),
    }
}

async fn authenticate() -> Result<Session> {
    let credentials = Credentials::from_env()?;
    Session::authenticate(&credentials)
        .await
        .with_context(|| format!("authenticating against {}", credentials.auth_url))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

// =============================================================================
// Commands
// =============================================================================

async fn register_nodes(args: RegisterNodesArgs) -> Result<()> {
    let mut nodes =
        load_nodes(&args.nodes).with_context(|| format!("loading {}", args.nodes.display()))?;
    let session = authenticate().await?;

    if args.kernel_name.is_some() || args.ramdisk_name.is_some() {
        let glance = session.glance()?;
        let images = create_or_find_kernel_and_ramdisk(
            &glance,
            args.kernel_name.as_deref(),
            args.ramdisk_name.as_deref(),
            None,
            None,
            true,
        )
        .await?;
        populate_deploy_images(&mut nodes, images.kernel.as_deref(), images.ramdisk.as_deref());
    }

    if session.has_service("ironic") {
        let ironic = session.ironic()?;
        let options = RegisterOptions {
            remove: args.remove,
            validate: !args.no_validate,
            ..Default::default()
        };
        let summary = register_all_nodes(&ironic, &nodes, &options).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        warn!("Ironic is not registered in Keystone, using the deprecated Nova baremetal extension");
        let nova = session.nova()?;
        let registered =
            register_all_nova_bm_nodes(&nova, args.service_host.as_deref(), &nodes, &REGISTER_RETRY)
                .await?;
        info!(nodes = registered.len(), "Registered nodes with Nova baremetal");
    }
    Ok(())
}

/// Deploy image ids for flavors; names looked up in Glance win over ids
async fn find_image_ids(session: &Session, args: &SetupFlavorsArgs) -> Result<(String, String)> {
    let mut kernel = args.kernel.clone();
    let mut ramdisk = args.ramdisk.clone();

    if args.kernel_name.is_some() || args.ramdisk_name.is_some() {
        let glance = session.glance()?;
        let images = create_or_find_kernel_and_ramdisk(
            &glance,
            args.kernel_name.as_deref(),
            args.ramdisk_name.as_deref(),
            None,
            None,
            true,
        )
        .await?;
        kernel = images.kernel.or(kernel);
        ramdisk = images.ramdisk.or(ramdisk);
    }

    let kernel = kernel.ok_or_else(|| {
        Error::Configuration(format!(
            "Can not find kernel with name {} registered in Glance.",
            args.kernel_name.as_deref().unwrap_or_default()
        ))
    })?;
    let ramdisk = ramdisk.ok_or_else(|| {
        Error::Configuration(format!(
            "Can not find ramdisk with name {} registered in Glance.",
            args.ramdisk_name.as_deref().unwrap_or_default()
        ))
    })?;
    Ok((kernel, ramdisk))
}

async fn setup_flavors(args: SetupFlavorsArgs) -> Result<()> {
    let root_disk = root_disk_from_env()?;
    let session = authenticate().await?;
    let nova = session.nova()?;

    flavors::cleanup_flavors(&nova).await?;
    let (kernel, ramdisk) = find_image_ids(&session, &args).await?;

    let created = if let Some(path) = &args.nodes {
        let nodes = load_nodes(path).with_context(|| format!("loading {}", path.display()))?;
        flavors::create_flavors_from_nodes(&nova, &nodes, &kernel, &ramdisk, root_disk).await?
    } else if let Some(path) = &args.flavors {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let specs = flavors::parse_flavors(&content)?;
        flavors::create_flavors_from_list(&nova, &specs, &kernel, &ramdisk).await?
    } else {
        let ironic = session.ironic()?;
        flavors::create_flavors_from_backend(&nova, &ironic, &kernel, &ramdisk, root_disk).await?
    };

    info!(flavors = created.len(), "Flavors created");
    Ok(())
}

async fn upload_kernel_ramdisk(args: UploadKernelRamdiskArgs) -> Result<()> {
    let session = authenticate().await?;
    let glance = session.glance()?;
    let images = create_or_find_kernel_and_ramdisk(
        &glance,
        Some(args.kernel.as_str()),
        Some(args.ramdisk.as_str()),
        Some(args.kernel_file.as_path()),
        Some(args.ramdisk_file.as_path()),
        false,
    )
    .await?;
    info!(kernel = ?images.kernel, ramdisk = ?images.ramdisk, "Kernel and ramdisk available");
    Ok(())
}

async fn init_keystone(args: InitKeystoneArgs) -> Result<()> {
    let client = KeystoneAdminClient::with_admin_token(&args.host, &args.admin_token, args.public.as_deref())?;
    let options = InitializeOptions {
        admin_email: args.admin_email,
        admin_password: args.admin_password,
        region: args.region,
        endpoint: KeystoneEndpointOptions {
            host: args.host,
            ssl: args.ssl,
            public: args.public,
            admin: args.admin,
            internal: args.internal,
            public_port: args.public_port,
            admin_port: args.admin_port,
            internal_port: args.internal_port,
        },
        poll: RetryPolicy::polling(
            Duration::from_secs(args.timeout),
            Duration::from_secs(args.poll_interval),
        ),
    };
    keystone::initialize(&client, &options).await?;
    Ok(())
}

async fn setup_endpoints(args: SetupEndpointsArgs) -> Result<()> {
    let endpoints: IndexMap<String, EndpointOverrides> = read_json(&args.services)?;
    let credentials = Credentials::from_env()?;
    let internal_host = keystone::host_from_url(&credentials.auth_url)?;

    let session = Session::authenticate(&credentials).await?;
    let identity = session.identity_admin()?;
    keystone::setup_endpoints(
        &identity,
        &endpoints,
        &internal_host,
        args.public.as_deref(),
        args.region.as_deref(),
    )
    .await?;
    info!(services = endpoints.len(), "Endpoints registered");
    Ok(())
}

async fn setup_neutron(args: SetupNeutronArgs) -> Result<()> {
    let description = NetworkDescription::load(&args.network_json)
        .with_context(|| format!("loading {}", args.network_json.display()))?;
    let session = authenticate().await?;
    let neutron = session.neutron()?;
    let identity = session.identity_admin()?;

    let setup = initialize_neutron(&neutron, &identity, &description).await?;
    info!(network = %setup.network_id, subnet = %setup.subnet_id, "Neutron initialized");
    Ok(())
}

fn generate_keystone_pki(args: GenerateKeystonePkiArgs) -> Result<()> {
    match (args.heatenv, args.directory) {
        (Some(heatenv), _) => {
            pki::generate_certs_into_json(&heatenv, args.seed)?;
        }
        (None, Some(directory)) => pki::create_and_write_ca_and_signing_pairs(&directory)?,
        (None, None) => anyhow::bail!("A directory or --heatenv is required."),
    }
    Ok(())
}

fn generate_ssl_cert(args: GenerateSslCertArgs) -> Result<()> {
    pki::generate_cert_into_json(&args.heat_env, &args.name, args.overwrite)?;
    Ok(())
}

fn generate_ssl_ca(args: GenerateSslCaArgs) -> Result<()> {
    pki::create_and_write_ssl_ca(&args.directory, args.overwrite)?;
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &LoggingArgs) {
    let default = if args.debug { Level::DEBUG } else { Level::INFO };
    let level = match args.log_level.as_deref().map(str::to_lowercase).as_deref() {
        Some("trace") => Level::TRACE,
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") => Level::WARN,
        Some("error") => Level::ERROR,
        _ => default,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
