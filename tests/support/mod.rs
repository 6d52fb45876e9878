//! Shared fixtures: in-memory targets shaped like real framework containers.

#![allow(dead_code)]

use obsinject::runtime::{ExecOutput, HttpResponse, MockHttpClient, MockRuntime, MockTarget};
use obsinject::{InstrumentationOrchestrator, ObsConfig};
use std::sync::Arc;

pub const FLASK_APP: &str = "from flask import Flask\n\napp = Flask(__name__)\n\n\n@app.route('/')\ndef index():\n    return 'ok'\n";

pub const EXPRESS_PACKAGE: &str = r#"{
  "name": "shop-api",
  "version": "1.0.0",
  "main": "server.js",
  "dependencies": {
    "express": "^4.18.2"
  }
}"#;

/// Flask container matching every signal: env, manifest, process, port, header.
pub fn flask_target(id: &str) -> MockTarget {
    MockTarget::new(id)
        .with_env("FLASK_APP", "app.py")
        .with_env("PATH", "/usr/local/bin:/usr/bin")
        .with_file("requirements.txt", "Flask==2.3.0\ngunicorn==21.2.0\n")
        .with_file("app.py", FLASK_APP)
        .with_processes(
            "USER PID %CPU %MEM COMMAND\nroot 1 0.1 1.2 python app.py\nroot 17 0.0 0.1 ps aux\n",
        )
        .with_port(5000, Some(15000))
        .with_ip("172.17.0.2")
        .with_command("pip install", ExecOutput::success("Successfully installed opentelemetry-api"))
        .with_command("pip show", ExecOutput::success("Name: opentelemetry-api\nVersion: 1.21.0"))
}

pub fn express_target(id: &str) -> MockTarget {
    MockTarget::new(id)
        .with_env("NODE_ENV", "production")
        .with_file("package.json", EXPRESS_PACKAGE)
        .with_file("server.js", "const express = require('express');\nconst app = express();\napp.listen(3000);\n")
        .with_processes("USER PID COMMAND\nnode 1 node server.js\n")
        .with_port(3000, None)
        .with_command("npm install", ExecOutput::success("added 64 packages"))
        .with_command("node -e", ExecOutput::success(""))
}

pub fn spring_target(id: &str) -> MockTarget {
    MockTarget::new(id)
        .with_file(
            "pom.xml",
            r#"<project><parent><groupId>org.springframework.boot</groupId><artifactId>spring-boot-starter-parent</artifactId><version>3.2.0</version></parent></project>"#,
        )
        .with_processes("PID COMMAND\n1 java -jar /app/orders.jar\n")
        .with_port(8080, None)
}

pub fn http_client() -> Arc<MockHttpClient> {
    let http = MockHttpClient::new();
    http.serve(
        "http://172.17.0.2:5000",
        HttpResponse::new(200).with_header("Server", "Werkzeug/2.3.0 Python/3.11.6"),
    );
    Arc::new(http)
}

pub fn config() -> ObsConfig {
    let mut config = ObsConfig::builtin();
    config.probe_timeout_secs = 2;
    config.target_timeout_secs = 10;
    config.max_concurrency = 2;
    config
}

pub fn orchestrator(runtime: &Arc<MockRuntime>) -> InstrumentationOrchestrator {
    InstrumentationOrchestrator::new(runtime.clone(), http_client(), config())
}

/// One-second per-target deadline with a longer per-command limit, so a stalled
/// target hits the deadline first.
pub fn short_deadline_orchestrator(runtime: &Arc<MockRuntime>) -> InstrumentationOrchestrator {
    let mut config = config();
    config.probe_timeout_secs = 5;
    config.install_timeout_secs = 5;
    config.target_timeout_secs = 1;
    InstrumentationOrchestrator::new(runtime.clone(), http_client(), config)
}
