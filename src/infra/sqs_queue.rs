use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::app::ports::{QueuePort, QueueReceipt};
use crate::error::{QuickpitchError, Result};
use crate::infra::sigv4::{uri_encode, AwsCredentials, SigV4Signer};

const SQS_API_VERSION: &str = "2012-11-05";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Amazon SQS producer using the query API. `target` is the full queue URL.
pub struct SqsQueue {
    signer: SigV4Signer,
    client: reqwest::Client,
}

impl SqsQueue {
    pub fn new(credentials: AwsCredentials, region: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            signer: SigV4Signer::new(credentials, region, "sqs"),
            client,
        })
    }
}

fn send_message_body(payload: &[u8]) -> Result<String> {
    let message = std::str::from_utf8(payload)
        .map_err(|_| QuickpitchError::queue("SQS message body must be UTF-8"))?;
    Ok(format!(
        "Action=SendMessage&MessageBody={}&Version={SQS_API_VERSION}",
        uri_encode(message, true)
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResponse {
    send_message_result: SendMessageResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResult {
    message_id: String,
}

fn extract_message_id(xml: &str) -> Option<String> {
    let response: SendMessageResponse = match quick_xml::de::from_str(xml) {
        Ok(response) => response,
        Err(e) => {
            debug!("Unparseable SendMessage response: {}", e);
            return None;
        }
    };
    let id = response.send_message_result.message_id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

#[async_trait]
impl QueuePort for SqsQueue {
    async fn send(&self, target: &str, payload: Vec<u8>) -> Result<QueueReceipt> {
        let url = Url::parse(target)
            .map_err(|e| QuickpitchError::queue(format!("invalid queue url '{target}': {e}")))?;
        let body = send_message_body(&payload)?;
        let signed = self
            .signer
            .sign_headers("POST", &url, FORM_CONTENT_TYPE, body.as_bytes(), Utc::now())?;

        let mut request = self.client.post(url.clone()).body(body);
        for (name, value) in &signed.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            warn!("SQS SendMessage to {} failed with {}: {}", target, status, text);
            return Err(QuickpitchError::queue(format!("SendMessage returned {status}")));
        }
        let message_id = extract_message_id(&text)
            .ok_or_else(|| QuickpitchError::queue("SendMessage response had no MessageId"))?;
        debug!("SQS accepted message {} on {}", message_id, target);
        Ok(QueueReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_is_form_encoded() {
        let body = send_message_body(br#"{"pitchId":"p 1"}"#).unwrap();
        assert_eq!(
            body,
            "Action=SendMessage&MessageBody=%7B%22pitchId%22%3A%22p%201%22%7D&Version=2012-11-05"
        );
        assert!(send_message_body(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_extract_message_id() {
        let xml = r#"<SendMessageResponse><SendMessageResult>
            <MD5OfMessageBody>fafb00f5732ab283681e124bf8747ed1</MD5OfMessageBody>
            <MessageId>5fea7756-0ea4-451a-a703-a558b933e274</MessageId>
        </SendMessageResult></SendMessageResponse>"#;
        assert_eq!(
            extract_message_id(xml).as_deref(),
            Some("5fea7756-0ea4-451a-a703-a558b933e274")
        );
        assert_eq!(extract_message_id("<Error/>"), None);
        assert_eq!(extract_message_id("<SendMessageResponse><SendMessageResult>"), None);
    }

    #[test]
    fn test_message_id_only_read_from_send_message_result() {
        let error = r#"<ErrorResponse><Error>
            <Code>InvalidParameterValue</Code>
            <Message>expected <![CDATA[<MessageId>abc</MessageId>]]></Message>
        </Error></ErrorResponse>"#;
        assert_eq!(extract_message_id(error), None);

        let commented = r#"<SendMessageResponse><SendMessageResult>
            <!-- <MessageId>stale</MessageId> -->
            <MessageId>real-id</MessageId>
        </SendMessageResult></SendMessageResponse>"#;
        assert_eq!(extract_message_id(commented).as_deref(), Some("real-id"));
    }
}
