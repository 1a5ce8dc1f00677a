//! Chunks written by the host.

use std::fmt;

use grid_bridge_core::Scalar;

use crate::{ProtocolError, Result, FUNCTION_CALL_PREFIX};

/// A complete inbound chunk, as terminated by a blank line
#[derive(Debug, Clone, PartialEq)]
pub enum InboundChunk {
    /// Source text for the engine
    Script(String),
    /// Call of a registered function, answered with a function-result frame
    Call { name: String, args: Vec<String> },
}

impl InboundChunk {
    /// Classify a chunk.
    ///
    /// A chunk starting with `#FUNCTION#` carries a JSON array: the function
    /// name followed by its arguments. Non-string arguments are taken as
    /// their JSON text.
    pub fn parse(chunk: &str) -> Result<Self> {
        let Some(payload) = chunk.trim_start().strip_prefix(FUNCTION_CALL_PREFIX) else {
            return Ok(InboundChunk::Script(chunk.to_string()));
        };

        let parts: Vec<serde_json::Value> = serde_json::from_str(payload.trim())?;
        let mut parts = parts.into_iter().map(|part| match part {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        let name = parts
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProtocolError::MalformedFrame("function call without a name".into()))?;

        Ok(InboundChunk::Call {
            name,
            args: parts.collect(),
        })
    }
}

/// Build the line a host sends to call a registered function
pub fn encode_call(name: &str, args: &[&str]) -> Result<String> {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(name);
    parts.extend_from_slice(args);
    Ok(format!("{FUNCTION_CALL_PREFIX}{}", serde_json::to_string(&parts)?))
}

/// One cache assignment in a host's reply to a data request,
/// e.g. `sheet_data["0!A1"] = 5`
#[derive(Debug, Clone, PartialEq)]
pub struct DataLine {
    /// Cache key, `<sheet>!<A1>`
    pub key: String,
    pub value: Scalar,
}

impl DataLine {
    pub fn new<S: Into<String>>(key: S, value: Scalar) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Render a full reply: one line per entry, then the blank terminator
    pub fn reply(lines: &[DataLine]) -> String {
        let mut out = String::new();
        for line in lines {
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

fn quote_script_string(s: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for DataLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sheet_data[")?;
        quote_script_string(&self.key, f)?;
        f.write_str("] = ")?;
        match &self.value {
            Scalar::Empty => f.write_str("nil"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) if n.is_nan() => f.write_str("0/0"),
            Scalar::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "math.huge" } else { "-math.huge" })
            }
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => quote_script_string(s, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_script_chunk() {
        let chunk = "x = 1\nprint(x)\n";
        assert_eq!(
            InboundChunk::parse(chunk).unwrap(),
            InboundChunk::Script(chunk.to_string())
        );
    }

    #[test]
    fn test_parse_call_chunk() {
        let chunk = "#FUNCTION#[\"double\", \"21\", 3]\n";
        assert_eq!(
            InboundChunk::parse(chunk).unwrap(),
            InboundChunk::Call {
                name: "double".into(),
                args: vec!["21".into(), "3".into()],
            }
        );
    }

    #[test]
    fn test_parse_call_errors() {
        assert!(InboundChunk::parse("#FUNCTION#[]").is_err());
        assert!(InboundChunk::parse("#FUNCTION#[\"\"]").is_err());
        assert!(matches!(
            InboundChunk::parse("#FUNCTION#double(1)"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_encode_call() {
        let line = encode_call("add", &["1", "2"]).unwrap();
        assert_eq!(line, r#"#FUNCTION#["add","1","2"]"#);
        assert_eq!(
            InboundChunk::parse(&line).unwrap(),
            InboundChunk::Call {
                name: "add".into(),
                args: vec!["1".into(), "2".into()],
            }
        );
    }

    #[test]
    fn test_data_lines() {
        let reply = DataLine::reply(&[
            DataLine::new("0!A1", Scalar::Number(5.0)),
            DataLine::new("0!A2", Scalar::text("say \"hi\"")),
            DataLine::new("0!A3", Scalar::Empty),
            DataLine::new("0!A4", Scalar::Bool(true)),
        ]);
        assert_eq!(
            reply,
            "sheet_data[\"0!A1\"] = 5\n\
             sheet_data[\"0!A2\"] = \"say \\\"hi\\\"\"\n\
             sheet_data[\"0!A3\"] = nil\n\
             sheet_data[\"0!A4\"] = true\n\n"
        );
    }
}
