//! Invoice rendering: tera HTML template, converted to PDF through
//! `wkhtmltopdf` when the binary is on PATH. Without it the HTML itself
//! is attached, so invoice delivery never depends on a system package.

use std::process::Stdio;

use ferrobot_core::chrono::Utc;
use ferrobot_db::repositories::InvoiceRecord;
use ferrobot_telegram::render::format_money;
use tera::{Context, Tera};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

const INVOICE_TEMPLATE: &str = "invoice.html.tera";
const COMPANY_NAME: &str = "Ferrobot Suministros S.L.";

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("template error: {0}")]
    Template(String),
    #[error("pdf conversion failed: {0}")]
    Conversion(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The rendered artifact handed to the mailer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvoiceArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct InvoiceRenderer {
    tera: Tera,
    wkhtmltopdf_path: Option<String>,
}

impl InvoiceRenderer {
    pub fn new() -> Result<Self, InvoiceError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            INVOICE_TEMPLATE,
            include_str!("../../../templates/invoice.html.tera"),
        )
        .map_err(|error| InvoiceError::Template(error.to_string()))?;

        let wkhtmltopdf_path =
            which::which("wkhtmltopdf").ok().map(|path| path.to_string_lossy().to_string());
        match &wkhtmltopdf_path {
            Some(path) => info!(event_name = "invoice.converter_found", path, "wkhtmltopdf found"),
            None => warn!(
                event_name = "invoice.converter_missing",
                "wkhtmltopdf not on PATH; invoices will be delivered as HTML"
            ),
        }

        Ok(Self { tera, wkhtmltopdf_path })
    }

    /// Forces the HTML fallback path regardless of what is on PATH.
    pub fn without_converter() -> Result<Self, InvoiceError> {
        let mut renderer = Self::new()?;
        renderer.wkhtmltopdf_path = None;
        Ok(renderer)
    }

    pub fn render_html(&self, invoice: &InvoiceRecord) -> Result<String, InvoiceError> {
        let mut context = Context::new();
        context.insert("company_name", COMPANY_NAME);
        context.insert("order_id", invoice.order.order_id.as_str());
        context.insert("issued_on", &Utc::now().format("%d/%m/%Y").to_string());
        context.insert("customer_name", &invoice.order.customer_name);
        context.insert("customer_email", &invoice.order.customer_email);
        context.insert("shipping_address", &invoice.order.shipping_address);
        context.insert("total", &format_money(invoice.order.total_amount));

        let lines: Vec<serde_json::Value> = invoice
            .lines
            .iter()
            .map(|line| {
                serde_json::json!({
                    "sku": line.product_sku.as_str(),
                    "name": line.product_name,
                    "quantity": line.quantity,
                    "unit_price": format_money(line.unit_price),
                    "subtotal": format_money(line.line_total()),
                })
            })
            .collect();
        context.insert("lines", &lines);

        self.tera
            .render(INVOICE_TEMPLATE, &context)
            .map_err(|error| InvoiceError::Template(error.to_string()))
    }

    /// Renders the full artifact: PDF when the converter is available,
    /// HTML otherwise.
    pub async fn render(&self, invoice: &InvoiceRecord) -> Result<InvoiceArtifact, InvoiceError> {
        let html = self.render_html(invoice)?;
        let order_id = invoice.order.order_id.as_str();

        match &self.wkhtmltopdf_path {
            Some(converter) => {
                let pdf = html_to_pdf(converter, &html).await?;
                Ok(InvoiceArtifact {
                    filename: format!("{order_id}.pdf"),
                    content_type: "application/pdf",
                    bytes: pdf,
                })
            }
            None => Ok(InvoiceArtifact {
                filename: format!("{order_id}.html"),
                content_type: "text/html",
                bytes: html.into_bytes(),
            }),
        }
    }
}

async fn html_to_pdf(converter: &str, html: &str) -> Result<Vec<u8>, InvoiceError> {
    let mut child = Command::new(converter)
        .args(["--quiet", "--encoding", "utf-8", "-", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(html.as_bytes()).await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(InvoiceError::Conversion(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(output.stdout)
}
