//! AMI frame decoding

use tracing::trace;

use crate::{
    buffer::RawBuffer,
    constants::{BANNER_PREFIX, FIELD_SEPARATOR, LINE_TERMINATOR, VARIABLE_SEPARATOR},
    encoding::TransportEncoding,
    error::AmiResult,
    headers::AmiHeader,
    message::AmiMessage,
};

/// Remove the greeting line when a chunk starts with it.
///
/// Without a line terminator the chunk is returned as-is; the partial banner
/// line has no `": "` and is dropped later by line parsing.
fn strip_banner(chunk: &[u8]) -> &[u8] {
    if !chunk.starts_with(BANNER_PREFIX.as_bytes()) {
        return chunk;
    }
    let terminator = LINE_TERMINATOR.as_bytes();
    match chunk
        .windows(terminator.len())
        .position(|w| w == terminator)
    {
        Some(pos) => {
            trace!(
                "[RECV] Stripped banner: {}",
                String::from_utf8_lossy(&chunk[..pos])
            );
            &chunk[pos + terminator.len()..]
        }
        None => chunk,
    }
}

/// Parse the text of one frame. `None` for a blank keep-alive frame.
///
/// Lines without `": "`, or with an empty key or value, are dropped. `Variable`
/// lines go into the nested variable map; a sub-entry missing its name or value
/// is dropped but still creates the map. A sub-entry splits on its first `=`
/// only, so `Variable: K=a=b` stores `a=b` under `K` rather than truncating
/// the value at the second `=`.
pub(crate) fn parse_frame(text: &str) -> Option<AmiMessage> {
    if text
        .split(LINE_TERMINATOR)
        .all(str::is_empty)
    {
        return None;
    }

    let mut message = AmiMessage::new();
    for line in text.split(LINE_TERMINATOR) {
        let Some((key, value)) = line.split_once(FIELD_SEPARATOR) else {
            if !line.is_empty() {
                trace!("[RECV] Dropping line without separator: {:?}", line);
            }
            continue;
        };
        if key.is_empty() || value.is_empty() {
            trace!("[RECV] Dropping line with empty key or value: {:?}", line);
            continue;
        }

        if key == AmiHeader::Variable.as_str() {
            let variables = message.variables_mut();
            match value.split_once(VARIABLE_SEPARATOR) {
                Some((name, val)) if !name.is_empty() && !val.is_empty() => {
                    variables.insert(name.to_string(), val.to_string());
                }
                _ => trace!("[RECV] Dropping malformed Variable entry: {:?}", value),
            }
        } else {
            message.set_field(key, value);
        }
    }
    Some(message)
}

/// Incremental decoder turning socket chunks into [`AmiMessage`]s.
///
/// One decoder per connection; it owns the raw buffer holding the partial
/// frame between reads.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: RawBuffer,
    encoding: TransportEncoding,
}

impl FrameDecoder {
    pub fn new(encoding: TransportEncoding) -> Self {
        Self {
            buffer: RawBuffer::new(),
            encoding,
        }
    }

    /// Append a chunk and return every message it completed, in arrival order.
    ///
    /// Fails only when the buffered partial frame exceeds the size ceiling.
    pub fn decode(&mut self, chunk: &[u8]) -> AmiResult<Vec<AmiMessage>> {
        self.buffer
            .extend_from_slice(strip_banner(chunk));

        let frames = self
            .buffer
            .take_frames();
        self.buffer
            .check_size_limits()?;

        trace!(
            "[RECV] {} complete frames, {} bytes buffered",
            frames.len(),
            self.buffer.len()
        );

        Ok(frames
            .iter()
            .filter_map(|raw| parse_frame(&self.encoding.decode(raw)))
            .collect())
    }

    /// Bytes of the partial frame currently held.
    pub fn buffered_len(&self) -> usize {
        self.buffer
            .len()
    }

    pub fn is_idle(&self) -> bool {
        self.buffer
            .is_empty()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(TransportEncoding::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::AmiAction;

    fn decode_all(chunks: &[&[u8]]) -> Vec<AmiMessage> {
        let mut decoder = FrameDecoder::default();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(
                decoder
                    .decode(chunk)
                    .unwrap(),
            );
        }
        out
    }

    #[test]
    fn test_parse_originate_with_variables() {
        let payload = "Action: Originate\r\n\
            ActionID: 76d0392a-b397-463f-a9fc-cc5ee49e0839\r\n\
            Async: true\r\n\
            Channel: Local/s@callback_op/n\r\n\
            Context: callback_op-ext\r\n\
            Exten: 79000000000\r\n\
            Priority: 1\r\n\
            Variable: CALL_DST=78000000000\r\n\
            Variable: CALL_ID=76d0392a-b397-463f-a9fc-cc5ee49e0839\r\n\
            Variable: CALL_QUEUE=aa0f3f8e-87a7-4ec6-9ad5-673e90de057f\r\n\
            Variable: CALL_SRC=79000000000\r\n\
            Variable: COMP_ID=1f4d3f81-544c-ffc2-a798-074b23fb42db\r\n\r\n";

        let messages = decode_all(&[payload.as_bytes()]);
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];

        assert_eq!(
            msg.to_json(),
            r#"{"Action":"Originate","ActionID":"76d0392a-b397-463f-a9fc-cc5ee49e0839","Async":"true","Channel":"Local/s@callback_op/n","Context":"callback_op-ext","Exten":"79000000000","Priority":"1","Variable":{"CALL_DST":"78000000000","CALL_ID":"76d0392a-b397-463f-a9fc-cc5ee49e0839","CALL_QUEUE":"aa0f3f8e-87a7-4ec6-9ad5-673e90de057f","CALL_SRC":"79000000000","COMP_ID":"1f4d3f81-544c-ffc2-a798-074b23fb42db"}}"#
        );
    }

    #[test]
    fn test_banner_stripped() {
        let messages = decode_all(&[
            b"Asterisk Call Manager/5.0.1\r\nResponse: Success\r\nMessage: Authentication accepted\r\n\r\n",
        ]);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0]
                .fields()
                .len(),
            2
        );
        assert_eq!(messages[0].message(), Some("Authentication accepted"));
    }

    #[test]
    fn test_banner_alone_then_response() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder
            .decode(b"Asterisk Call Manager/2.10.3\r\n")
            .unwrap()
            .is_empty());
        assert!(decoder.is_idle());
        let messages = decoder
            .decode(b"Response: Success\r\n\r\n")
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_success());
    }

    #[test]
    fn test_incomplete_frame_withheld() {
        let mut decoder = FrameDecoder::default();
        let out = decoder
            .decode(b"Response: Success\r\nActionID: 1\r\n")
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(decoder.buffered_len(), 32);

        let out = decoder
            .decode(b"\r\n")
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action_id(), Some("1"));
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_split_anywhere_matches_single_chunk() {
        let wire = AmiAction::new("Status")
            .with_action_id("abc")
            .set("Channel", "SIP/100-0000001")
            .to_wire_format()
            .unwrap();
        let bytes = wire.as_bytes();
        let whole = decode_all(&[bytes]);
        assert_eq!(whole.len(), 1);

        for cut in 1..bytes.len() {
            let mut decoder = FrameDecoder::default();
            let first = decoder
                .decode(&bytes[..cut])
                .unwrap();
            assert!(first.is_empty(), "emitted early at cut {}", cut);
            let second = decoder
                .decode(&bytes[cut..])
                .unwrap();
            assert_eq!(second, whole, "mismatch at cut {}", cut);
        }
    }

    #[test]
    fn test_scalar_action_round_trip() {
        let action = AmiAction::new("Status")
            .with_action_id("id-1")
            .set("Channel", "PJSIP/200")
            .set("Variables", "a,b");
        let wire = action
            .to_wire_format()
            .unwrap();
        let messages = decode_all(&[wire.as_bytes()]);
        assert_eq!(messages.len(), 1);
        let keys: Vec<_> = messages[0]
            .fields()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Action", "Status"),
                ("ActionID", "id-1"),
                ("Channel", "PJSIP/200"),
                ("Variables", "a,b"),
            ]
        );
    }

    #[test]
    fn test_variable_list_round_trip() {
        let wire = AmiAction::new("Setvar")
            .set("Variable", vec!["A=1".to_string(), "B=2".to_string()])
            .to_wire_format()
            .unwrap();
        let messages = decode_all(&[wire.as_bytes()]);
        let vars = messages[0]
            .variables()
            .unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(messages[0].variable("A"), Some("1"));
        assert_eq!(messages[0].variable("B"), Some("2"));
        assert_eq!(messages[0].get("Variable"), None);
    }

    #[test]
    fn test_multiple_frames_one_chunk() {
        let messages = decode_all(&[
            b"Event: FullyBooted\r\nStatus: Fully Booted\r\n\r\nResponse: Success\r\nActionID: 7\r\n\r\nEvent: Par",
        ]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].event(), Some("FullyBooted"));
        assert_eq!(messages[1].action_id(), Some("7"));
    }

    #[test]
    fn test_blank_keepalive_skipped() {
        let messages = decode_all(&[b"\r\n\r\n", b"Response: Success\r\n\r\n\r\n\r\n"]);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let messages = decode_all(&[b"Message: first\r\nMessage: second\r\n\r\n"]);
        assert_eq!(messages[0].message(), Some("second"));
        assert_eq!(
            messages[0]
                .fields()
                .len(),
            1
        );
    }

    #[test]
    fn test_malformed_lines_dropped() {
        let messages = decode_all(&[
            b"Response: Success\r\nNoSeparator\r\n: novalue\r\nEmpty: \r\nOutput: a: b\r\n\r\n",
        ]);
        let msg = &messages[0];
        assert_eq!(msg.response(), Some("Success"));
        assert_eq!(msg.get("Empty"), None);
        assert_eq!(msg.get("Output"), Some("a: b"));
        assert_eq!(
            msg.fields()
                .len(),
            2
        );
    }

    #[test]
    fn test_malformed_variable_entries() {
        let messages = decode_all(&[
            b"Event: VarSet\r\nVariable: =x\r\nVariable: y=\r\nVariable: noequals\r\nVariable: K=a=b\r\n\r\n",
        ]);
        let vars = messages[0]
            .variables()
            .unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(messages[0].variable("K"), Some("a=b"));
    }

    #[test]
    fn test_malformed_variable_still_creates_map() {
        let messages = decode_all(&[b"Event: VarSet\r\nVariable: broken\r\n\r\n"]);
        assert!(messages[0]
            .variables()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_frame_of_only_garbage_yields_empty_message() {
        let messages = decode_all(&[b"garbage\r\n\r\n"]);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_empty());
    }

    #[test]
    fn test_lf_only_is_not_a_frame() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder
            .decode(b"Response: Success\n\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let wire = "Message: Привет\r\n\r\n".as_bytes();
        // cut in the middle of the two-byte 'П'
        let cut = "Message: ".len() + 1;
        let messages = decode_all(&[&wire[..cut], &wire[cut..]]);
        assert_eq!(messages[0].message(), Some("Привет"));
    }

    #[test]
    fn test_latin1_decoding() {
        let mut decoder = FrameDecoder::new(TransportEncoding::Latin1);
        let out = decoder
            .decode(b"CallerIDName: Jos\xe9\r\n\r\n")
            .unwrap();
        assert_eq!(out[0].get("CallerIDName"), Some("Jos\u{e9}"));
    }
}
