//! Routing Unit Rendering
//!
//! Renders one nginx server block per storage location. Output depends only
//! on the location, the admin identity and the router settings, so the same
//! input always yields the same bytes.

use crate::domain::ports::{StorageLocation, User};
use crate::routing::naming::encode_root;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// First line of every generated unit
pub const MANAGED_MARKER: &str = "# Managed by webdav-provisioner. Local edits are replaced on the next run.";

const ROOT_HEADER: &str = "# root: ";
const PORT_HEADER: &str = "# port: ";
const ROOT_VARIABLE: &str = "$webdav_root";

/// Extended methods nginx-dav-ext serves read-only
pub const EXTENDED_METHODS: &[&str] = &["PROPFIND", "OPTIONS"];

/// Mutating methods allowed on every location
pub const MUTATING_METHODS: &[&str] = &["PUT", "DELETE", "MKCOL", "COPY", "MOVE"];

// =============================================================================
// Router Settings
// =============================================================================

/// Global settings shared by every generated unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSettings {
    /// Directory the serving process includes units from
    pub units_dir: PathBuf,
    /// File-name prefix identifying units owned by this tool
    pub unit_prefix: String,
    /// Directory for access and error logs
    pub log_dir: PathBuf,
    /// Credential file referenced by basic auth
    pub credential_file: PathBuf,
    /// Basic-auth realm
    pub realm: String,
    /// gzip compression level (1-9)
    pub gzip_level: u8,
    /// MIME types compressed in addition to text/html
    pub gzip_types: Vec<String>,
    /// Maximum request body (`0` disables the limit)
    pub max_body_size: String,
    /// Directory listings
    pub autoindex: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            units_dir: PathBuf::from("/etc/nginx/conf.d"),
            unit_prefix: "webdav-".to_string(),
            log_dir: PathBuf::from("/var/log/nginx"),
            credential_file: PathBuf::from("/etc/nginx/webdav.htpasswd"),
            realm: "WebDAV".to_string(),
            gzip_level: 6,
            gzip_types: [
                "text/plain",
                "text/css",
                "text/xml",
                "text/javascript",
                "application/json",
                "application/javascript",
                "application/xml",
                "application/xml+rss",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_body_size: "0".to_string(),
            autoindex: true,
        }
    }
}

impl RouterSettings {
    /// Per-location access log
    pub fn access_log(&self, location: &StorageLocation) -> PathBuf {
        self.log_dir.join(format!(
            "{}{}.access.log",
            self.unit_prefix,
            encode_root(&location.root)
        ))
    }

    /// Error log shared by every location
    pub fn error_log(&self) -> PathBuf {
        self.log_dir.join(format!("{}error.log", self.unit_prefix))
    }
}

// =============================================================================
// User Routing
// =============================================================================

/// Directory path with exactly one trailing slash, as `alias` expects
fn dir_string(path: &Path) -> String {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches('/');
    format!("{}/", trimmed)
}

/// The tree an authenticated identity is confined to: the location root for
/// the admin, `root/<identity>/` for everyone else
pub fn alias_for_identity(location: &StorageLocation, admin: &User, identity: &str) -> String {
    if identity == admin.name() {
        dir_string(&location.root)
    } else {
        dir_string(&location.root.join(identity))
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Render the server block for one location
pub fn render_unit(location: &StorageLocation, admin: &User, settings: &RouterSettings) -> String {
    let root = dir_string(&location.root);
    let mut out = String::with_capacity(2048);

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{}", MANAGED_MARKER);
    let _ = writeln!(out, "{}{}", ROOT_HEADER, location.root.display());
    let _ = writeln!(out, "{}{}", PORT_HEADER, location.port);
    let _ = writeln!(out);
    let _ = writeln!(out, "server {{");
    let _ = writeln!(out, "    listen {};", location.port);
    let _ = writeln!(out, "    server_name _;");
    let _ = writeln!(out);
    let _ = writeln!(out, "    access_log {};", settings.access_log(location).display());
    let _ = writeln!(out, "    error_log {};", settings.error_log().display());
    let _ = writeln!(out);
    let _ = writeln!(out, "    gzip on;");
    let _ = writeln!(out, "    gzip_vary on;");
    let _ = writeln!(out, "    gzip_proxied any;");
    let _ = writeln!(out, "    gzip_comp_level {};", settings.gzip_level);
    let _ = writeln!(out, "    gzip_types {};", settings.gzip_types.join(" "));
    let _ = writeln!(out);
    let _ = writeln!(out, "    client_max_body_size {};", settings.max_body_size);
    let _ = writeln!(out);
    let _ = writeln!(out, "    set {} \"{}$remote_user/\";", ROOT_VARIABLE, root);
    let _ = writeln!(out, "    if ($remote_user = \"{}\") {{", admin.name());
    let _ = writeln!(out, "        set {} \"{}\";", ROOT_VARIABLE, root);
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out);
    let _ = writeln!(out, "    location / {{");
    let _ = writeln!(out, "        auth_basic \"{}\";", settings.realm);
    let _ = writeln!(
        out,
        "        auth_basic_user_file {};",
        settings.credential_file.display()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "        alias {};", ROOT_VARIABLE);
    let _ = writeln!(
        out,
        "        autoindex {};",
        if settings.autoindex { "on" } else { "off" }
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "        dav_methods {};", MUTATING_METHODS.join(" "));
    let _ = writeln!(out, "        dav_ext_methods {};", EXTENDED_METHODS.join(" "));
    let _ = writeln!(out, "        create_full_put_path on;");
    let _ = writeln!(out, "        dav_access user:rw group:r;");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");

    out
}

// =============================================================================
// Parsing previously generated units
// =============================================================================

/// Root and port recorded in a previously generated unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitHeader {
    pub root: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Recover root and port from a unit's text. Prefers the header comments and
/// falls back to the admin `set` line and the `listen` directive for units
/// whose header was edited away.
pub fn parse_unit_header(text: &str) -> UnitHeader {
    let mut header = UnitHeader::default();
    let mut admin_root = None;
    let mut listen = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(root) = line.strip_prefix(ROOT_HEADER) {
            if !root.trim().is_empty() {
                header.root = Some(PathBuf::from(root.trim()));
            }
        } else if let Some(port) = line.strip_prefix(PORT_HEADER) {
            header.port = port.trim().parse().ok();
        } else if let Some(rest) = trimmed.strip_prefix("listen ") {
            listen = listen.or_else(|| {
                rest.trim_end_matches(';')
                    .split_whitespace()
                    .next()
                    .and_then(|p| p.rsplit(':').next())
                    .and_then(|p| p.parse().ok())
            });
        } else if let Some(rest) = trimmed.strip_prefix(&format!("set {} \"", ROOT_VARIABLE)) {
            let value = rest.trim_end_matches(';').trim_end_matches('"');
            if !value.ends_with("$remote_user/") {
                let value = value.trim_end_matches('/');
                admin_root = Some(PathBuf::from(if value.is_empty() { "/" } else { value }));
            }
        }
    }

    header.root = header.root.or(admin_root);
    header.port = header.port.or(listen);
    header
}
