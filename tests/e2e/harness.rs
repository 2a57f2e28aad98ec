use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::json;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone)]
pub struct TestContext {
    pub bin_path: PathBuf,
    pub tmp_root: PathBuf,
}

pub struct TestEnv {
    pub root: PathBuf,
    pub home: PathBuf,
    pub xdg_config: PathBuf,
}

pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl TestContext {
    pub fn new() -> Result<Self, String> {
        let bin_path = if let Some(path) = std::env::var_os("CARGO_BIN_EXE_rolecheck") {
            PathBuf::from(path)
        } else {
            let manifest_dir = std::env::var_os("CARGO_MANIFEST_DIR")
                .map(PathBuf::from)
                .ok_or_else(|| "CARGO_MANIFEST_DIR not set".to_string())?;
            let candidate = manifest_dir.join("target").join("debug").join("rolecheck");
            if !candidate.exists() {
                let status = Command::new("cargo")
                    .arg("build")
                    .current_dir(&manifest_dir)
                    .status()
                    .map_err(|e| format!("Failed to run cargo build: {}", e))?;
                if !status.success() {
                    return Err("cargo build failed".to_string());
                }
            }
            candidate
        };

        let tmp_root = std::env::temp_dir().join("rolecheck-e2e");
        fs::create_dir_all(&tmp_root).map_err(|e| format!("Failed to create temp root: {}", e))?;

        Ok(Self { bin_path, tmp_root })
    }

    pub fn create_env(&self, name: &str) -> Result<TestEnv, String> {
        let dir = self.unique_temp_dir(name)?;
        let home = dir.join("home");
        let xdg_config = home.join(".config");
        fs::create_dir_all(&xdg_config)
            .map_err(|e| format!("Failed to create config dir: {}", e))?;

        Ok(TestEnv {
            root: dir,
            home,
            xdg_config,
        })
    }

    fn unique_temp_dir(&self, name: &str) -> Result<PathBuf, String> {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_nanos();
        let dir = self
            .tmp_root
            .join(format!("{}-{}-{}", name, nanos, counter));
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create temp dir: {}", e))?;
        Ok(dir)
    }

    pub fn run_rolecheck(&self, env: &TestEnv, args: &[&str]) -> Result<CommandOutput, String> {
        self.run_rolecheck_with_env(env, args, &[])
    }

    /// Runs the binary with extra environment variables set after the
    /// inherited `ROLECHECK_*` ones are cleared
    pub fn run_rolecheck_with_env(
        &self,
        env: &TestEnv,
        args: &[&str],
        vars: &[(&str, &str)],
    ) -> Result<CommandOutput, String> {
        if std::env::var("ROLECHECK_E2E_LOG").is_ok() {
            eprintln!(
                "command: rolecheck {:?} env {:?} (cwd: {})",
                args,
                vars,
                env.root.display()
            );
        }
        let mut command = Command::new(&self.bin_path);
        command
            .args(args)
            .current_dir(&env.root)
            .env("HOME", &env.home)
            .env("XDG_CONFIG_HOME", &env.xdg_config)
            .env_remove("ROLECHECK_CONFIG")
            .env_remove("ROLECHECK_BASE_URL")
            .env_remove("ROLECHECK_INSECURE")
            .env_remove("ROLECHECK_LOG")
            .env_remove("HTTP_PROXY")
            .env_remove("http_proxy")
            .env_remove("ALL_PROXY")
            .env_remove("all_proxy");
        for (key, value) in vars {
            command.env(key, value);
        }
        let output = command
            .output()
            .map_err(|e| format!("Failed to run command: {}", e))?;

        Ok(CommandOutput::from_output(output))
    }
}

impl CommandOutput {
    pub fn from_output(output: Output) -> Self {
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Self {
            status,
            stdout,
            stderr,
        }
    }

    pub fn assert_success(&self) -> Result<(), String> {
        self.assert_status(0)
    }

    pub fn assert_status(&self, expected: i32) -> Result<(), String> {
        if self.status == expected {
            Ok(())
        } else {
            Err(format!(
                "Expected exit {}, got exit {}.\nstdout: {}\nstderr: {}",
                expected, self.status, self.stdout, self.stderr
            ))
        }
    }

    pub fn assert_stdout_contains(&self, needle: &str) -> Result<(), String> {
        if self.stdout.contains(needle) {
            Ok(())
        } else {
            Err(format!(
                "Expected stdout to contain '{}'.\nstdout: {}",
                needle, self.stdout
            ))
        }
    }

    pub fn assert_stdout_not_contains(&self, needle: &str) -> Result<(), String> {
        if !self.stdout.contains(needle) {
            Ok(())
        } else {
            Err(format!(
                "Expected stdout to not contain '{}'.\nstdout: {}",
                needle, self.stdout
            ))
        }
    }

    pub fn assert_stderr_contains(&self, needle: &str) -> Result<(), String> {
        if self.stderr.contains(needle) {
            Ok(())
        } else {
            Err(format!(
                "Expected stderr to contain '{}'.\nstderr: {}",
                needle, self.stderr
            ))
        }
    }

    pub fn assert_stderr_not_contains(&self, needle: &str) -> Result<(), String> {
        if !self.stderr.contains(needle) {
            Ok(())
        } else {
            Err(format!(
                "Expected stderr to not contain '{}'.\nstderr: {}",
                needle, self.stderr
            ))
        }
    }
}

pub fn write_file(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create parent dirs: {}", e))?;
    }
    fs::write(path, content).map_err(|e| format!("Failed to write file: {}", e))
}

pub fn parse_json(output: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(output).map_err(|e| format!("Invalid JSON output: {}", e))
}

/// A user known to the stub API
#[derive(Clone)]
pub struct StubUser {
    pub email: &'static str,
    pub password: &'static str,
    pub role: u32,
}

/// The four PTMS fixture users with their seeded passwords
pub fn fixture_users() -> Vec<StubUser> {
    vec![
        StubUser { email: "admin@ptms.com", password: "admin123", role: 1 },
        StubUser { email: "manager@ptms.com", password: "manager123", role: 2 },
        StubUser { email: "employee@ptms.com", password: "employee123", role: 3 },
        StubUser { email: "viewer@ptms.com", password: "viewer123", role: 4 },
    ]
}

/// Behavior of the stub API
#[derive(Clone, Default)]
pub struct StubApi {
    pub users: Vec<StubUser>,
    /// (email, route) pairs answered with HTTP 403
    pub forbidden: Vec<(&'static str, &'static str)>,
    /// (email, route) pairs answered with HTTP 200 and `success: false`
    pub soft_denied: Vec<(&'static str, &'static str)>,
}

/// The parts of an HTTP request the stub API looks at
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub auth: Option<String>,
    pub body: Vec<u8>,
}

impl StubRequest {
    fn accepts_json(&self) -> bool {
        let is_json = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"))
        };
        is_json(&self.content_type) && is_json(&self.accept)
    }
}

impl StubApi {
    pub fn with_fixture_users() -> Self {
        Self {
            users: fixture_users(),
            ..Default::default()
        }
    }

    fn respond(&self, request: &StubRequest) -> (u16, String) {
        let method = request.method.as_str();
        let body = request.body.as_slice();
        let auth = request.auth.as_deref();
        let route = request
            .path
            .trim_start_matches('/')
            .trim_start_matches("api/");

        // the PTMS API only speaks JSON
        if !request.accepts_json() {
            return (
                415,
                json!({"success": false, "message": "JSON Content-Type and Accept required"})
                    .to_string(),
            );
        }

        if method == "POST" && route == "login.php" {
            let creds: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();
            let email = creds["email"].as_str().unwrap_or_default();
            let password = creds["password"].as_str().unwrap_or_default();
            return match self
                .users
                .iter()
                .find(|u| u.email == email && u.password == password)
            {
                Some(user) => (
                    200,
                    json!({
                        "success": true,
                        "token": format!("tok-{}", user.email),
                        "user": {
                            "firstname": "Test",
                            "lastname": user.email.split('@').next().unwrap_or_default(),
                            "department": "QA",
                            "position": "Tester",
                            "type": user.role,
                        }
                    })
                    .to_string(),
                ),
                None => (
                    401,
                    json!({"success": false, "message": "Invalid credentials"}).to_string(),
                ),
            };
        }

        let Some(user) = auth
            .and_then(|a| a.strip_prefix("Bearer tok-"))
            .and_then(|email| self.users.iter().find(|u| u.email == email))
        else {
            return (401, json!({"success": false, "message": "Unauthorized"}).to_string());
        };

        if listed(&self.forbidden, user.email, route) {
            return (403, json!({"success": false, "message": "Forbidden"}).to_string());
        }
        if listed(&self.soft_denied, user.email, route) {
            return (
                200,
                json!({"success": false, "message": "Not allowed for this role"}).to_string(),
            );
        }

        match (method, route) {
            ("GET", "projects.php") => (200, json!({"success": true, "projects": []}).to_string()),
            ("GET", "work-types.php") => (200, json!({"success": true, "work_types": []}).to_string()),
            ("GET", "reports.php") => (200, json!({"success": true, "reports": []}).to_string()),
            ("GET", "profile.php") => (200, json!({"success": true, "email": user.email}).to_string()),
            ("GET", "system/status") => (200, json!({"success": true, "status": "ok"}).to_string()),
            ("POST", "time-entry.php") => {
                let entry: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();
                if entry["date"].as_str().is_some_and(|d| d.len() == 10) && entry["hours"] == 8.0 {
                    (200, json!({"success": true, "id": 42}).to_string())
                } else {
                    (400, json!({"success": false, "message": "Invalid entry"}).to_string())
                }
            }
            _ => (404, json!({"success": false, "message": "Not found"}).to_string()),
        }
    }
}

fn listed(pairs: &[(&str, &str)], email: &str, route: &str) -> bool {
    pairs.iter().any(|(e, r)| *e == email && *r == route)
}

/// Minimal HTTP/1.1 server answering from a [`StubApi`], one request per connection
pub struct StubServer {
    pub base_url: String,
}

impl StubServer {
    pub fn start(api: StubApi) -> Result<Self, String> {
        let listener =
            TcpListener::bind("127.0.0.1:0").map_err(|e| format!("Failed to bind stub: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| format!("Failed to read stub address: {}", e))?;
        let api = Arc::new(api);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let api = Arc::clone(&api);
                std::thread::spawn(move || {
                    let _ = handle_connection(stream, &api);
                });
            }
        });

        Ok(Self {
            base_url: format!("http://{}/api/", addr),
        })
    }
}

fn handle_connection(mut stream: TcpStream, api: &StubApi) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut content_type = None;
    let mut accept = None;
    let mut auth = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "content-type" => content_type = Some(value.trim().to_string()),
                "accept" => accept = Some(value.trim().to_string()),
                "authorization" => auth = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    let request = StubRequest {
        method,
        path,
        content_type,
        accept,
        auth,
        body,
    };
    let (status, payload) = api.respond(&request);
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        415 => "Unsupported Media Type",
        _ => "Not Found",
    };
    write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        payload.len(),
        payload
    )?;
    stream.flush()
}

/// A base URL nothing is listening on
pub fn closed_base_url() -> Result<String, String> {
    let listener =
        TcpListener::bind("127.0.0.1:0").map_err(|e| format!("Failed to bind: {}", e))?;
    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to read address: {}", e))?;
    drop(listener);
    Ok(format!("http://{}/api/", addr))
}

/// Sends a bare request with the given headers and returns the status code
pub fn raw_status(base_url: &str, request_line: &str, headers: &[&str]) -> Result<u16, String> {
    let host = base_url
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default();
    let mut stream =
        TcpStream::connect(host).map_err(|e| format!("Failed to connect to stub: {}", e))?;
    let mut request = format!("{}\r\nHost: {}\r\n", request_line, host);
    for header in headers {
        request.push_str(header);
        request.push_str("\r\n");
    }
    request.push_str("Content-Length: 0\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .map_err(|e| format!("Failed to send request: {}", e))?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .map_err(|e| format!("Failed to read response: {}", e))?;
    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| format!("Malformed response: {}", response))
}
