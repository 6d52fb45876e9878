//! Generated telemetry bootstrap sources.
//!
//! The generated file configures a tracer provider with an OTLP exporter, tags the
//! resource with the service name and framework, and enables the framework's
//! auto-instrumentation. `OTEL_EXPORTER_OTLP_ENDPOINT` and `OTEL_SERVICE_NAME` in the
//! container's environment override the baked-in values at runtime.

use crate::stack::Framework;

/// Tag recorded as `service.instrumented_by`.
pub fn instrumented_by() -> String {
    format!("{}-{}", crate::NAME, crate::VERSION)
}

/// Quoted literal valid in both Python and JavaScript source.
fn quoted(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

pub(crate) fn python_instrumentor(framework: Framework) -> Option<(&'static str, &'static str)> {
    match framework {
        Framework::Flask => Some(("opentelemetry.instrumentation.flask", "FlaskInstrumentor")),
        Framework::Django => Some(("opentelemetry.instrumentation.django", "DjangoInstrumentor")),
        Framework::FastApi => Some(("opentelemetry.instrumentation.fastapi", "FastAPIInstrumentor")),
        Framework::Express | Framework::NestJs | Framework::SpringBoot | Framework::Unknown => None,
    }
}

pub(crate) fn node_instrumentation(framework: Framework) -> Option<(&'static str, &'static str)> {
    match framework {
        Framework::Express => Some(("@opentelemetry/instrumentation-express", "ExpressInstrumentation")),
        Framework::NestJs => Some(("@opentelemetry/instrumentation-nestjs-core", "NestInstrumentation")),
        Framework::Flask
        | Framework::Django
        | Framework::FastApi
        | Framework::SpringBoot
        | Framework::Unknown => None,
    }
}

/// `otel_init.py` for a Python framework. Importing the module is enough: the
/// framework instrumentor patches the framework globally, so it must be imported
/// before the application module creates its app object.
pub fn python_bootstrap(framework: Framework, service_name: &str, collector_endpoint: &str) -> String {
    let framework_import = python_instrumentor(framework)
        .map(|(module, class)| (format!("from {} import {}\n", module, class), format!("{}().instrument()\n", class)))
        .unwrap_or_default();

    format!(
        r#""""OpenTelemetry bootstrap generated by {tool}. Delete this file to disable."""
import os

from opentelemetry import metrics, trace
from opentelemetry.exporter.otlp.proto.grpc.metric_exporter import OTLPMetricExporter
from opentelemetry.exporter.otlp.proto.grpc.trace_exporter import OTLPSpanExporter
from opentelemetry.instrumentation.requests import RequestsInstrumentor
from opentelemetry.sdk.metrics import MeterProvider
from opentelemetry.sdk.metrics.export import PeriodicExportingMetricReader
from opentelemetry.sdk.resources import Resource
from opentelemetry.sdk.trace import TracerProvider
from opentelemetry.sdk.trace.export import BatchSpanProcessor
{framework_import}
_endpoint = os.getenv("OTEL_EXPORTER_OTLP_ENDPOINT", {endpoint})

_resource = Resource.create(
    {{
        "service.name": os.getenv("OTEL_SERVICE_NAME", {service}),
        "service.framework": {framework},
        "service.instrumented_by": {tool},
    }}
)

_tracer_provider = TracerProvider(resource=_resource)
_tracer_provider.add_span_processor(
    BatchSpanProcessor(OTLPSpanExporter(endpoint=_endpoint, insecure=True))
)
trace.set_tracer_provider(_tracer_provider)

_metric_reader = PeriodicExportingMetricReader(
    OTLPMetricExporter(endpoint=_endpoint, insecure=True)
)
metrics.set_meter_provider(MeterProvider(resource=_resource, metric_readers=[_metric_reader]))

{framework_call}RequestsInstrumentor().instrument()
"#,
        tool = quoted(&instrumented_by()),
        framework_import = framework_import.0,
        framework_call = framework_import.1,
        endpoint = quoted(collector_endpoint),
        service = quoted(service_name),
        framework = quoted(framework.key()),
    )
}

/// `otel.js` for a Node.js framework. Must be required before the framework module.
pub fn node_bootstrap(framework: Framework, service_name: &str, collector_endpoint: &str) -> String {
    let (require_line, instance) = node_instrumentation(framework)
        .map(|(package, class)| {
            (
                format!("const {{ {} }} = require('{}');\n", class, package),
                format!("    new {}(),\n", class),
            )
        })
        .unwrap_or_default();

    format!(
        r#"// OpenTelemetry bootstrap generated by {tool_raw}. Delete this file to disable.
'use strict';

const {{ NodeTracerProvider }} = require('@opentelemetry/sdk-trace-node');
const {{ Resource }} = require('@opentelemetry/resources');
const {{ SemanticResourceAttributes }} = require('@opentelemetry/semantic-conventions');
const {{ OTLPTraceExporter }} = require('@opentelemetry/exporter-trace-otlp-grpc');
const {{ BatchSpanProcessor }} = require('@opentelemetry/sdk-trace-base');
const {{ registerInstrumentations }} = require('@opentelemetry/instrumentation');
const {{ HttpInstrumentation }} = require('@opentelemetry/instrumentation-http');
{require_line}
const endpoint = process.env.OTEL_EXPORTER_OTLP_ENDPOINT || {endpoint};

const provider = new NodeTracerProvider({{
  resource: Resource.default().merge(
    new Resource({{
      [SemanticResourceAttributes.SERVICE_NAME]: process.env.OTEL_SERVICE_NAME || {service},
      'service.framework': {framework},
      'service.instrumented_by': {tool},
    }})
  ),
}});

provider.addSpanProcessor(new BatchSpanProcessor(new OTLPTraceExporter({{ url: endpoint }})));
provider.register();

registerInstrumentations({{
  instrumentations: [
    new HttpInstrumentation(),
{instance}  ],
}});
"#,
        tool_raw = instrumented_by(),
        tool = quoted(&instrumented_by()),
        require_line = require_line,
        instance = instance,
        endpoint = quoted(collector_endpoint),
        service = quoted(service_name),
        framework = quoted(framework.key()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_bootstrap_flask() {
        let source = python_bootstrap(Framework::Flask, "obsinject-web", "http://otel-collector:4317");
        assert!(source.contains("from opentelemetry.instrumentation.flask import FlaskInstrumentor"));
        assert!(source.contains("FlaskInstrumentor().instrument()"));
        assert!(source.contains(r#"os.getenv("OTEL_EXPORTER_OTLP_ENDPOINT", "http://otel-collector:4317")"#));
        assert!(source.contains(r#""service.name": os.getenv("OTEL_SERVICE_NAME", "obsinject-web")"#));
        assert!(source.contains(r#""service.framework": "flask""#));
        assert!(!source.contains("DjangoInstrumentor"));
    }

    #[test]
    fn test_python_bootstrap_per_framework() {
        let django = python_bootstrap(Framework::Django, "svc", "http://c:4317");
        assert!(django.contains("DjangoInstrumentor().instrument()"));
        let fastapi = python_bootstrap(Framework::FastApi, "svc", "http://c:4317");
        assert!(fastapi.contains("FastAPIInstrumentor().instrument()"));
    }

    #[test]
    fn test_node_bootstrap_express_and_nest() {
        let express = node_bootstrap(Framework::Express, "obsinject-api", "http://otel-collector:4317");
        assert!(express.contains("require('@opentelemetry/instrumentation-express')"));
        assert!(express.contains("new ExpressInstrumentation(),"));
        assert!(express.contains(r#"process.env.OTEL_EXPORTER_OTLP_ENDPOINT || "http://otel-collector:4317""#));
        assert!(express.contains(r#"'service.framework': "express""#));

        let nest = node_bootstrap(Framework::NestJs, "svc", "http://c:4317");
        assert!(nest.contains("new NestInstrumentation(),"));
        assert!(!nest.contains("ExpressInstrumentation"));
    }

    #[test]
    fn test_values_are_escaped() {
        let source = python_bootstrap(Framework::Flask, "svc", r#"http://evil"); import os; ("#);
        assert!(source.contains(r#""http://evil\"); import os; (""#));
    }
}
