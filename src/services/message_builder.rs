//! services/message_builder.rs
//! Arma el MIME (texto + HTML) para un destinatario y, si hay base de
//! tracking, agrega el pixel de apertura y envuelve los links.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use lettre::message::{Mailbox, MultiPart};
use lettre::Message;
use regex::{Captures, Regex};

use crate::models::{
    account_model::Account, campaign_model::MessageTemplate, recipient_model::Recipient,
};

/// Ancho de línea de la alternativa en texto plano
const TEXT_WIDTH: usize = 78;

lazy_static! {
    static ref HREF_PATTERN: Regex = Regex::new(r#"(?i)href\s*=\s*"(https?://[^"]+)""#)
        .expect("HREF_PATTERN es una regex válida");
    static ref BODY_CLOSE: Regex =
        Regex::new(r"(?i)</body\s*>").expect("BODY_CLOSE es una regex válida");
}

pub fn open_pixel_url(base: &str, correlation_id: &str) -> String {
    format!(
        "{}/track.png?id={}",
        base,
        urlencoding::encode(correlation_id)
    )
}

pub fn click_url(base: &str, correlation_id: &str, target: &str) -> String {
    format!(
        "{}/click?id={}&url={}",
        base,
        urlencoding::encode(correlation_id),
        urlencoding::encode(target)
    )
}

/// Reescribe `href="http..."` hacia el redirect de clicks y agrega el pixel.
/// El valor del atributo se decodifica (`&amp;` -> `&`) antes de codificarlo
/// como parámetro.
pub fn apply_tracking(html: &str, base: &str, correlation_id: &str) -> String {
    let wrapped = HREF_PATTERN.replace_all(html, |caps: &Captures| {
        let target = html_escape::decode_html_entities(&caps[1]);
        format!(r#"href="{}""#, click_url(base, correlation_id, &target))
    });

    let pixel = format!(
        r#"<img src="{}" width="1" height="1" alt="" style="display:none" />"#,
        open_pixel_url(base, correlation_id)
    );

    match BODY_CLOSE.find_iter(&wrapped).last() {
        Some(m) => format!("{}{}{}", &wrapped[..m.start()], pixel, &wrapped[m.start()..]),
        None => format!("{}{}", wrapped, pixel),
    }
}

/// Alternativa en texto plano derivada del HTML.
pub fn html_to_text(html: &str) -> Result<String> {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH)
        .context("No se pudo convertir el HTML a texto plano")
}

pub fn build_message(
    template: &MessageTemplate,
    account: &Account,
    recipient: &Recipient,
    correlation_id: &str,
    tracking_base_url: Option<&str>,
) -> Result<Message> {
    let from = Mailbox::new(
        Some(account.display_name.clone()),
        account
            .sender_address()
            .parse()
            .context("Invalid from address")?,
    );
    let to = Mailbox::new(
        recipient.name.clone(),
        recipient
            .address
            .parse()
            .context("Invalid recipient address")?,
    );

    let html = match tracking_base_url {
        Some(base) => apply_tracking(&template.body, base, correlation_id),
        None => template.body.clone(),
    };
    let text = match &template.text_body {
        Some(text) => text.clone(),
        None => html_to_text(&template.body)?,
    };

    Message::builder()
        .from(from)
        .to(to)
        .subject(&template.subject)
        .multipart(MultiPart::alternative_plain_html(text, html))
        .context("No se pudo construir el mensaje")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_links_and_appends_pixel_before_body_close() {
        let html = r#"<html><body><a href="https://example.com/a?b=1">x</a> <a href="mailto:x@y.z">m</a></body></html>"#;
        let out = apply_tracking(html, "https://t.example.org", "cid-1");

        assert!(out.contains(
            r#"href="https://t.example.org/click?id=cid-1&url=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1""#
        ));
        // mailto no se toca
        assert!(out.contains(r#"href="mailto:x@y.z""#));
        let pixel_pos = out.find("track.png?id=cid-1").unwrap();
        assert!(pixel_pos < out.find("</body>").unwrap());
    }

    #[test]
    fn decodes_entities_in_href_before_encoding() {
        let html = r#"<a href="https://shop.example.com/?a=1&amp;b=2">x</a>"#;
        let out = apply_tracking(html, "https://t.example.org", "cid");

        assert!(out.contains("url=https%3A%2F%2Fshop.example.com%2F%3Fa%3D1%26b%3D2\""));
        assert!(!out.contains("amp%3B"));
    }

    #[test]
    fn pixel_goes_before_uppercase_body_close() {
        let html = "<HTML><BODY><p>hola</p></BODY></HTML>";
        let out = apply_tracking(html, "https://t.example.org", "cid");

        let pixel_pos = out.find("track.png?id=cid").unwrap();
        assert!(pixel_pos < out.find("</BODY>").unwrap());
        assert!(out.ends_with("</BODY></HTML>"));
    }

    #[test]
    fn plain_text_alternative_has_no_markup() {
        let text = html_to_text("<html><body><h1>Oferta</h1><p>Hola <b>Ana</b></p></body></html>")
            .unwrap();
        assert!(text.contains("Oferta"));
        assert!(text.contains("Hola"));
        assert!(text.contains("Ana"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn builds_message_with_display_names() {
        let account = Account {
            id: "ventas".to_string(),
            display_name: "Equipo Ventas".to_string(),
            secret: "s".to_string(),
            provider: "gmail".to_string(),
            from_address: Some("ventas@example.com".to_string()),
            daily_limit: None,
        };
        let recipient = Recipient {
            address: "ana@example.com".to_string(),
            name: Some("Ana".to_string()),
        };
        let template = MessageTemplate {
            subject: "Hola".to_string(),
            body: "<p>Hola</p>".to_string(),
            text_body: None,
        };

        let msg = build_message(&template, &account, &recipient, "cid", None).unwrap();
        let to: Vec<String> = msg.envelope().to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["ana@example.com".to_string()]);
        assert_eq!(
            msg.envelope().from().map(|a| a.to_string()),
            Some("ventas@example.com".to_string())
        );
    }
}
