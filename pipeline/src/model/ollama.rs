use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{LanguageModel, ModelError};

/// [LanguageModel] served by an Ollama server's `/api/generate` endpoint.
pub struct OllamaClient {
    agent: ureq::Agent,
    url: String,
    model: String,
    temperature: f64,
    timeout: Duration,
}

impl OllamaClient {
    /// `timeout` bounds the whole call: connecting, sending the prompt and reading the answer.
    pub fn new(base_url: &str, model: &str, temperature: f64, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            agent,
            url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_owned(),
            temperature,
            timeout,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LanguageModel for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        log::debug!("Sending {} byte prompt to {}.", prompt.len(), self.url);
        match self.agent.post(&self.url).send_json(&request) {
            Ok(resp) => resp
                .into_json::<GenerateResponse>()
                .map(|body| body.response)
                .map_err(|err| {
                    if is_timeout(&err) {
                        ModelError::Timeout(self.timeout)
                    } else {
                        ModelError::InvalidResponse(err.to_string())
                    }
                }),
            Err(ureq::Error::Status(status, resp)) => Err(ModelError::Status {
                status,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Err(ModelError::Timeout(self.timeout))
                } else {
                    Err(ModelError::Transport(transport.to_string()))
                }
            }
        }
    }
}

/// Looks through the error's sources for an I/O timeout.
fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        let timed_out = err.downcast_ref::<std::io::Error>().is_some_and(|io_err| {
            matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        });
        if timed_out {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread,
    };

    use googletest::prelude::*;

    use super::*;

    /// Serves a single HTTP request with `status` and `body`, returning the request body sent.
    fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            String::from_utf8(request_body).unwrap()
        });
        (base_url, handle)
    }

    #[gtest]
    fn generate_posts_prompt_and_reads_response() {
        let (base_url, server) = serve_once("200 OK", r#"{"response": "{\"vintage\": \"2020\"}", "done": true}"#);
        let client = OllamaClient::new(&base_url, "llama3.1:8b", 0.0, Duration::from_secs(5));

        let result = client.generate("Extract the table");
        let sent: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();

        expect_that!(result, ok(eq(r#"{"vintage": "2020"}"#)));
        expect_that!(
            sent,
            eq(&serde_json::json!({
                "model": "llama3.1:8b",
                "prompt": "Extract the table",
                "stream": false,
                "options": {"temperature": 0.0},
            }))
        );
    }

    #[gtest]
    fn error_status_is_reported() {
        let (base_url, server) = serve_once("404 Not Found", r#"{"error": "model not found"}"#);
        let client = OllamaClient::new(&base_url, "missing", 0.0, Duration::from_secs(5));

        let result = client.generate("prompt");
        server.join().unwrap();

        expect_that!(
            result,
            err(matches_pattern!(ModelError::Status {
                status: eq(&404),
                body: contains_substring("model not found"),
            }))
        );
    }

    #[gtest]
    fn malformed_body_is_invalid_response() {
        let (base_url, server) = serve_once("200 OK", r#"{"unexpected": 1}"#);
        let client = OllamaClient::new(&base_url, "m", 0.0, Duration::from_secs(5));

        let result = client.generate("prompt");
        server.join().unwrap();

        expect_that!(result, err(matches_pattern!(ModelError::InvalidResponse(anything()))));
    }

    #[gtest]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let _server = thread::spawn(move || {
            // Hold the connection open without answering until the client gives up.
            let (mut stream, _) = listener.accept().unwrap();
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink);
        });
        let client = OllamaClient::new(&base_url, "m", 0.0, Duration::from_millis(200));

        let result = client.generate("prompt");

        expect_that!(
            result.as_ref().map_err(ToString::to_string),
            err(eq("LLM request timed out after 200ms"))
        );
    }

    #[gtest]
    fn slowly_streamed_answer_hits_overall_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let _server = thread::spawn(move || {
            // Every byte arrives well within the limit, the whole body never does.
            let (mut stream, _) = listener.accept().unwrap();
            let headers = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 4096\r\n\r\n";
            if stream.write_all(headers.as_bytes()).is_err() {
                return;
            }
            for _ in 0..100 {
                thread::sleep(Duration::from_millis(50));
                if stream.write_all(b" ").and_then(|()| stream.flush()).is_err() {
                    return;
                }
            }
        });
        let client = OllamaClient::new(&base_url, "m", 0.0, Duration::from_millis(300));

        let start = std::time::Instant::now();
        let result = client.generate("prompt");

        expect_that!(
            result.as_ref().map_err(ToString::to_string),
            err(eq("LLM request timed out after 300ms"))
        );
        expect_that!(start.elapsed(), lt(Duration::from_secs(2)));
    }
}
