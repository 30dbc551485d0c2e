//! Incremental decoder for the chat service's line protocol.
//!
//! [`Scanner::scan`] decodes exactly one message per call, consuming the
//! bytes of that message including its line terminator. The grammar follows
//! RFC 1459 §2.3.1 with IRCv3 message tags, plus the service's habit of
//! ending a line straight after a middle parameter.
//!
//! - <https://ircv3.net/specs/extensions/message-tags.html>
//! - <https://tools.ietf.org/html/rfc1459.html#section-2.3.1>

use std::collections::HashMap;
use std::io;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::message::Message;

/// Longest prefix, command, or parameter accepted, in characters.
pub const MAX_TOKEN_LEN: usize = 512;

/// Longest tag section accepted. IRCv3 allows tags to take the line past 512.
pub const MAX_TAGS_LEN: usize = 8191;

/// Bytes dropped from a spoiled line before giving up on finding its end.
pub const MAX_LINE_LEN: usize = MAX_TAGS_LEN + MAX_TOKEN_LEN + 2;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum ScanError {
    /// The line was a bare terminator. Skip it and keep scanning.
    #[error("empty message")]
    EmptyMessage,
    #[error("prefix marker without a prefix")]
    NoPrefix,
    #[error("message has no command")]
    NoCommand,
    #[error("token longer than {limit} characters")]
    TooLong { limit: usize },
    #[error("invalid UTF-8 in stream")]
    InvalidUtf8,
    #[error("end of stream")]
    EndOfStream,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

impl ScanError {
    /// Fatal errors end the stream; everything else only spoils one line.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::Io(_))
    }
}

/// Buffered message decoder over any async byte source.
pub struct Scanner<R> {
    reader: R,
    buf: BytesMut,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            discarding: false,
        }
    }

    /// Decode the next message.
    ///
    /// A non-fatal error is returned as soon as it is found. The rest of the
    /// offending line is dropped at the start of the following call, which
    /// reports `TooLong` again if no line end shows up within
    /// [`MAX_LINE_LEN`] bytes.
    pub async fn scan(&mut self) -> Result<Message, ScanError> {
        if self.discarding {
            self.discard_line().await?;
        }
        let result = self.scan_message().await;
        if let Err(err) = &result {
            self.discarding = !err.is_fatal() && !matches!(err, ScanError::EmptyMessage);
        }
        result
    }

    async fn scan_message(&mut self) -> Result<Message, ScanError> {
        if self.at_line_end().await? {
            self.consume_line_end();
            return Err(ScanError::EmptyMessage);
        }

        let mut next = self.peek().await?.ok_or(ScanError::EndOfStream)?;
        let mut message = Message::default();

        if next == '@' {
            self.buf.advance(1);
            message.tags = self.read_tags().await?;
            next = self.peek().await?.ok_or(ScanError::EndOfStream)?;
        }

        if next == ':' {
            self.buf.advance(1);
            let prefix = self.read_token().await?;
            if prefix.is_empty() {
                return Err(ScanError::NoPrefix);
            }
            message.prefix = Some(prefix);
        }

        self.skip_spaces().await?;
        message.command = self.read_token().await?;
        if message.command.is_empty() {
            return Err(ScanError::NoCommand);
        }

        message.params = self.read_params().await?;
        Ok(message)
    }

    /// Reads `key=value;...` up to and including the separating space.
    /// Pairs with an empty key or value are dropped.
    async fn read_tags(&mut self) -> Result<HashMap<String, String>, ScanError> {
        let mut tags = HashMap::new();
        let mut key = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut count = 0;

        loop {
            if self.at_line_end().await? {
                return Err(ScanError::NoCommand);
            }
            let c = self.next().await?.ok_or(ScanError::EndOfStream)?;
            count += 1;
            if count > MAX_TAGS_LEN {
                return Err(ScanError::TooLong {
                    limit: MAX_TAGS_LEN,
                });
            }

            let c = match c {
                ' ' => {
                    insert_tag(&mut tags, key, value);
                    return Ok(tags);
                }
                ';' => {
                    insert_tag(
                        &mut tags,
                        std::mem::take(&mut key),
                        std::mem::take(&mut value),
                    );
                    in_value = false;
                    continue;
                }
                '=' if !in_value => {
                    in_value = true;
                    continue;
                }
                '\\' => unescape(self.next().await?.ok_or(ScanError::EndOfStream)?),
                c => c,
            };

            if in_value {
                value.push(c);
            } else {
                key.push(c);
            }
        }
    }

    /// Reads up to the next space (consumed) or line end (left in place).
    async fn read_token(&mut self) -> Result<String, ScanError> {
        let mut token = String::new();
        let mut count = 0;

        loop {
            let c = self.peek().await?.ok_or(ScanError::EndOfStream)?;
            if c == ' ' {
                self.buf.advance(1);
                return Ok(token);
            }
            if is_line_break(c) && self.at_line_end().await? {
                return Ok(token);
            }
            count += 1;
            if count > MAX_TOKEN_LEN {
                return Err(ScanError::TooLong {
                    limit: MAX_TOKEN_LEN,
                });
            }
            token.push(c);
            self.buf.advance(c.len_utf8());
        }
    }

    async fn read_params(&mut self) -> Result<Vec<String>, ScanError> {
        let mut params = Vec::new();

        loop {
            if self.at_line_end().await? {
                self.consume_line_end();
                return Ok(params);
            }

            match self.peek().await?.ok_or(ScanError::EndOfStream)? {
                ' ' => self.buf.advance(1),
                ':' => {
                    self.buf.advance(1);
                    params.push(self.read_trailing().await?);
                    return Ok(params);
                }
                _ => params.push(self.read_middle().await?),
            }
        }
    }

    /// Everything up to the line end, spaces included. Consumes the terminator.
    async fn read_trailing(&mut self) -> Result<String, ScanError> {
        let mut param = String::new();
        let mut count = 0;

        loop {
            if self.at_line_end().await? {
                self.consume_line_end();
                return Ok(param);
            }
            let c = self.next().await?.ok_or(ScanError::EndOfStream)?;
            count += 1;
            if count > MAX_TOKEN_LEN {
                return Err(ScanError::TooLong {
                    limit: MAX_TOKEN_LEN,
                });
            }
            param.push(c);
        }
    }

    /// Stops before `:` or a line end, since the service sometimes drops the
    /// trailing marker and ends the line directly after a middle parameter.
    async fn read_middle(&mut self) -> Result<String, ScanError> {
        let mut param = String::new();
        let mut count = 0;

        loop {
            let c = self.peek().await?.ok_or(ScanError::EndOfStream)?;
            match c {
                ' ' => {
                    self.buf.advance(1);
                    return Ok(param);
                }
                ':' => return Ok(param),
                c if is_line_break(c) && self.at_line_end().await? => return Ok(param),
                c => {
                    count += 1;
                    if count > MAX_TOKEN_LEN {
                        return Err(ScanError::TooLong {
                            limit: MAX_TOKEN_LEN,
                        });
                    }
                    param.push(c);
                    self.buf.advance(c.len_utf8());
                }
            }
        }
    }

    async fn skip_spaces(&mut self) -> Result<(), ScanError> {
        while self.peek().await? == Some(' ') {
            self.buf.advance(1);
        }
        Ok(())
    }

    /// Drops bytes through the next `\n`.
    async fn discard_line(&mut self) -> Result<(), ScanError> {
        let mut dropped = 0;
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                self.buf.advance(pos + 1);
                self.discarding = false;
                return Ok(());
            }
            dropped += self.buf.len();
            self.buf.clear();
            if dropped > MAX_LINE_LEN {
                return Err(ScanError::TooLong {
                    limit: MAX_LINE_LEN,
                });
            }
            if !self.fill(1).await? {
                return Err(ScanError::EndOfStream);
            }
        }
    }

    /// True when the buffer starts with `\r\n` or a bare `\n`.
    async fn at_line_end(&mut self) -> Result<bool, ScanError> {
        if !self.fill(1).await? {
            return Ok(false);
        }
        match self.buf[0] {
            b'\n' => Ok(true),
            b'\r' => Ok(self.fill(2).await? && self.buf[1] == b'\n'),
            _ => Ok(false),
        }
    }

    fn consume_line_end(&mut self) {
        let len = if self.buf.first() == Some(&b'\r') { 2 } else { 1 };
        self.buf.advance(len.min(self.buf.len()));
    }

    /// Decodes the next code point without consuming it. `None` at end of
    /// stream.
    async fn peek(&mut self) -> Result<Option<char>, ScanError> {
        if !self.fill(1).await? {
            return Ok(None);
        }
        let width = utf8_width(self.buf[0]);
        if width == 0 {
            return Err(ScanError::InvalidUtf8);
        }
        if !self.fill(width).await? {
            return Err(ScanError::EndOfStream);
        }
        std::str::from_utf8(&self.buf[..width])
            .map_err(|_| ScanError::InvalidUtf8)
            .map(|s| s.chars().next())
    }

    async fn next(&mut self) -> Result<Option<char>, ScanError> {
        let c = self.peek().await?;
        if let Some(c) = c {
            self.buf.advance(c.len_utf8());
        }
        Ok(c)
    }

    /// Reads until at least `n` bytes are buffered. False if the stream ends
    /// first.
    async fn fill(&mut self, n: usize) -> Result<bool, ScanError> {
        while self.buf.len() < n {
            self.buf.reserve(READ_CHUNK);
            if self.reader.read_buf(&mut self.buf).await? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn insert_tag(tags: &mut HashMap<String, String>, key: String, value: String) {
    if !key.is_empty() && !value.is_empty() {
        tags.insert(key, value);
    }
}

fn unescape(c: char) -> char {
    match c {
        ':' => ';',
        's' => ' ',
        '\\' => '\\',
        'r' => '\r',
        'n' => '\n',
        c => c,
    }
}

fn is_line_break(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// Byte length of a UTF-8 sequence from its leading byte, 0 if invalid.
fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    async fn scan_one(input: &str) -> Result<Message, ScanError> {
        Scanner::new(input.as_bytes()).scan().await
    }

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(f)
    }

    #[tokio::test]
    async fn scan_welcome_numeric() {
        let msg = scan_one(":tmi.twitch.tv 001 thewolfpack :Welcome, GLHF!\r\n")
            .await
            .unwrap();
        assert_eq!(
            msg,
            Message {
                tags: HashMap::new(),
                prefix: Some("tmi.twitch.tv".into()),
                command: "001".into(),
                params: params(&["thewolfpack", "Welcome, GLHF!"]),
            }
        );
    }

    #[tokio::test]
    async fn scan_tags_prefix_middles_and_trailing() {
        let msg = scan_one("@test=abc;foo=bar :prefix cmd par1 par2: trailing \r\n")
            .await
            .unwrap();
        assert_eq!(msg.tag("test"), Some("abc"));
        assert_eq!(msg.tag("foo"), Some("bar"));
        assert_eq!(msg.prefix.as_deref(), Some("prefix"));
        assert_eq!(msg.command, "cmd");
        assert_eq!(msg.params, params(&["par1", "par2", " trailing "]));
    }

    #[tokio::test]
    async fn scan_cap_ack() {
        let msg = scan_one(
            ":tmi.twitch.tv CAP * ACK :twitch.tv/tags twitch.tv/commands twitch.tv/membership\r\n",
        )
        .await
        .unwrap();
        assert!(!msg.has_tags());
        assert_eq!(msg.command, "CAP");
        assert_eq!(
            msg.params,
            params(&[
                "*",
                "ACK",
                "twitch.tv/tags twitch.tv/commands twitch.tv/membership"
            ])
        );
    }

    #[tokio::test]
    async fn scan_usernotice_with_escaped_tags() {
        let line = "@badge-info=subscriber/8;badges=subscriber/6,bits/75000;color=#1E90FF;\
            display-name=Ovojaytee;emotes=1837404:44-50/915234:164-169/1093027:13-18;flags=;\
            id=aa52e1d2-6ff5-42ba-b205-9d4a15f9dbf8;login=ovojaytee;mod=0;msg-id=resub;\
            msg-param-cumulative-months=7;msg-param-months=0;msg-param-should-share-streak=1;\
            msg-param-streak-months=8;msg-param-sub-plan-name=Channel\\sSubscription\\s(loeya);\
            msg-param-sub-plan=1000;room-id=166279350;subscriber=1;\
            system-msg=Ovojaytee\\ssubscribed\\sat\\sTier\\s1.\\sThey've\\ssubscribed\\sfor\\s8\\smonths,\\scurrently\\son\\sa\\s8\\smonth\\sstreak!;\
            tmi-sent-ts=1558352544376;user-id=160605648;user-type= \
            :tmi.twitch.tv USERNOTICE #loeya :Wow 8 months loeyaH our baby is almost here loeyaHM \
            can we name him Zlatan ? Thanks Queen for always starting off my day on a good note \
            with your wonderful content loeya1\r\n";

        let msg = scan_one(line).await.unwrap();
        assert_eq!(msg.tag("badge-info"), Some("subscriber/8"));
        assert_eq!(msg.tag("badges"), Some("subscriber/6,bits/75000"));
        assert_eq!(msg.tag("color"), Some("#1E90FF"));
        assert_eq!(
            msg.tag("emotes"),
            Some("1837404:44-50/915234:164-169/1093027:13-18")
        );
        assert_eq!(
            msg.tag("msg-param-sub-plan-name"),
            Some("Channel Subscription (loeya)")
        );
        assert_eq!(
            msg.tag("system-msg"),
            Some("Ovojaytee subscribed at Tier 1. They've subscribed for 8 months, currently on a 8 month streak!")
        );
        assert_eq!(msg.tag("tmi-sent-ts"), Some("1558352544376"));
        assert_eq!(msg.tag("user-id"), Some("160605648"));
        // Empty values are dropped.
        assert_eq!(msg.tag("flags"), None);
        assert_eq!(msg.tag("user-type"), None);

        assert_eq!(msg.prefix.as_deref(), Some("tmi.twitch.tv"));
        assert_eq!(msg.command, "USERNOTICE");
        assert_eq!(msg.params.len(), 2);
        assert_eq!(msg.params[0], "#loeya");
        assert!(msg.params[1].starts_with("Wow 8 months loeyaH"));
        assert!(msg.params[1].ends_with("wonderful content loeya1"));
    }

    #[tokio::test]
    async fn scan_unescapes_every_sequence() {
        let msg = scan_one("@k=a\\:b\\sc\\\\d\\re\\nf\\x CMD\r\n").await.unwrap();
        assert_eq!(msg.tag("k"), Some("a;b c\\d\re\nfx"));
    }

    #[tokio::test]
    async fn scan_drops_empty_tag_pairs() {
        let msg = scan_one("@a=;b;=c;d=1 CMD\r\n").await.unwrap();
        assert_eq!(msg.tags.len(), 1);
        assert_eq!(msg.tag("d"), Some("1"));
    }

    #[tokio::test]
    async fn scan_duplicate_tag_keeps_last() {
        let msg = scan_one("@a=1;a=2 CMD\r\n").await.unwrap();
        assert_eq!(msg.tag("a"), Some("2"));
    }

    #[tokio::test]
    async fn scan_missing_trailing_marker() {
        let msg = scan_one(":tmi.twitch.tv ROOMSTATE #loeya\r\n").await.unwrap();
        assert_eq!(msg.command, "ROOMSTATE");
        assert_eq!(msg.params, params(&["#loeya"]));
    }

    #[tokio::test]
    async fn scan_command_without_params() {
        let msg = scan_one("RECONNECT\r\n").await.unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "RECONNECT");
        assert!(msg.params.is_empty());
    }

    #[tokio::test]
    async fn scan_skips_redundant_spaces() {
        let msg = scan_one("PRIVMSG   #a    b  :hi there\r\n").await.unwrap();
        assert_eq!(msg.params, params(&["#a", "b", "hi there"]));
    }

    #[tokio::test]
    async fn scan_multibyte_text() {
        let msg = scan_one("@display-name=ナルト PRIVMSG #été :héllo 👋 wörld\r\n")
            .await
            .unwrap();
        assert_eq!(msg.tag("display-name"), Some("ナルト"));
        assert_eq!(msg.params, params(&["#été", "héllo 👋 wörld"]));
    }

    #[tokio::test]
    async fn scan_bare_crlf_is_empty_message() {
        let mut scanner = Scanner::new("\r\nPING :tmi.twitch.tv\r\n".as_bytes());
        assert!(matches!(scanner.scan().await, Err(ScanError::EmptyMessage)));
        let msg = scanner.scan().await.unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, params(&["tmi.twitch.tv"]));
    }

    #[tokio::test]
    async fn scan_prefix_marker_without_text() {
        let mut scanner = Scanner::new(": PING\r\nPING :x\r\n".as_bytes());
        assert!(matches!(scanner.scan().await, Err(ScanError::NoPrefix)));
        assert_eq!(scanner.scan().await.unwrap().command, "PING");
    }

    #[tokio::test]
    async fn scan_tags_without_command() {
        let mut scanner = Scanner::new("@a=1 \r\nPING :x\r\n".as_bytes());
        assert!(matches!(scanner.scan().await, Err(ScanError::NoCommand)));
        assert_eq!(scanner.scan().await.unwrap().command, "PING");
    }

    #[tokio::test]
    async fn scan_rejects_overlong_trailing_and_recovers() {
        let input = format!("PRIVMSG #a :{}\r\nPING :x\r\n", "a".repeat(MAX_TOKEN_LEN + 1));
        let mut scanner = Scanner::new(input.as_bytes());
        assert!(matches!(
            scanner.scan().await,
            Err(ScanError::TooLong { limit: MAX_TOKEN_LEN })
        ));
        assert_eq!(scanner.scan().await.unwrap().command, "PING");
    }

    #[tokio::test]
    async fn scan_reports_overlong_line_before_it_ends() {
        use tokio::io::AsyncWriteExt;

        let (mut tx, rx) = tokio::io::duplex(4096);
        let mut scanner = Scanner::new(rx);
        let line = format!("PRIVMSG #a :{}", "a".repeat(600));
        tx.write_all(line.as_bytes()).await.unwrap();

        let first = timeout(WAIT, scanner.scan()).await;
        assert!(matches!(
            first,
            Ok(Err(ScanError::TooLong { limit: MAX_TOKEN_LEN }))
        ));

        tx.write_all(b"aaa\r\nPING :x\r\n").await.unwrap();
        let next = timeout(WAIT, scanner.scan()).await.unwrap().unwrap();
        assert_eq!(next.command, "PING");
        assert_eq!(next.params, params(&["x"]));
    }

    #[tokio::test]
    async fn scan_gives_up_on_a_line_that_never_ends() {
        use tokio::io::AsyncWriteExt;

        let (mut tx, rx) = tokio::io::duplex(4096);
        let writer = tokio::spawn(async move {
            tx.write_all(&vec![b'a'; MAX_LINE_LEN * 2]).await.unwrap();
            tx
        });
        let mut scanner = Scanner::new(rx);

        let first = timeout(WAIT, scanner.scan()).await;
        assert!(matches!(
            first,
            Ok(Err(ScanError::TooLong { limit: MAX_TOKEN_LEN }))
        ));
        let second = timeout(WAIT, scanner.scan()).await;
        assert!(matches!(
            second,
            Ok(Err(ScanError::TooLong { limit: MAX_LINE_LEN }))
        ));
        writer.abort();
    }

    #[tokio::test]
    async fn scan_rejects_overlong_tag_section_and_recovers() {
        let input = format!("@a={} PING\r\nPING :ok\r\n", "x".repeat(MAX_TAGS_LEN));
        let mut scanner = Scanner::new(input.as_bytes());
        assert!(matches!(
            scanner.scan().await,
            Err(ScanError::TooLong { limit: MAX_TAGS_LEN })
        ));
        let msg = scanner.scan().await.unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, params(&["ok"]));
    }

    #[tokio::test]
    async fn scan_accepts_tag_section_at_the_cap() {
        // Key, `=`, value and the separating space add up to the cap.
        let value = "x".repeat(MAX_TAGS_LEN - 3);
        let msg = scan_one(&format!("@a={} PING\r\n", value)).await.unwrap();
        assert_eq!(msg.tag("a"), Some(value.as_str()));
        assert_eq!(msg.command, "PING");
    }

    #[tokio::test]
    async fn scan_rejects_overlong_prefix_and_recovers() {
        let input = format!(":{} PING\r\nPING :x\r\n", "p".repeat(MAX_TOKEN_LEN + 1));
        let mut scanner = Scanner::new(input.as_bytes());
        assert!(matches!(
            scanner.scan().await,
            Err(ScanError::TooLong { limit: MAX_TOKEN_LEN })
        ));
        assert_eq!(scanner.scan().await.unwrap().command, "PING");
    }

    #[tokio::test]
    async fn scan_rejects_overlong_command_and_recovers() {
        let input = format!("{}\r\nPING :x\r\n", "C".repeat(MAX_TOKEN_LEN + 1));
        let mut scanner = Scanner::new(input.as_bytes());
        assert!(matches!(
            scanner.scan().await,
            Err(ScanError::TooLong { limit: MAX_TOKEN_LEN })
        ));
        assert_eq!(scanner.scan().await.unwrap().command, "PING");
    }

    #[tokio::test]
    async fn scan_rejects_overlong_middle() {
        let input = format!("PRIVMSG {}\r\n", "a".repeat(MAX_TOKEN_LEN + 1));
        assert!(matches!(
            scan_one(&input).await,
            Err(ScanError::TooLong { .. })
        ));
    }

    #[tokio::test]
    async fn scan_invalid_utf8_spoils_one_line() {
        let mut input = b"PRIVMSG #a :\xff\xfe\r\n".to_vec();
        input.extend_from_slice(b"PING :x\r\n");
        let mut scanner = Scanner::new(input.as_slice());
        assert!(matches!(scanner.scan().await, Err(ScanError::InvalidUtf8)));
        assert_eq!(scanner.scan().await.unwrap().command, "PING");
    }

    #[tokio::test]
    async fn scan_end_of_stream() {
        let mut scanner = Scanner::new(&b""[..]);
        assert!(matches!(scanner.scan().await, Err(ScanError::EndOfStream)));

        let mut scanner = Scanner::new(&b"PRIVMSG #a :half a li"[..]);
        let err = scanner.scan().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn scan_sequential_messages_in_order() {
        let mut scanner =
            Scanner::new("JOIN #a\r\nPART #a\nPING :tmi.twitch.tv\r\n".as_bytes());
        assert_eq!(scanner.scan().await.unwrap().command, "JOIN");
        assert_eq!(scanner.scan().await.unwrap().command, "PART");
        assert_eq!(scanner.scan().await.unwrap().command, "PING");
        assert!(matches!(scanner.scan().await, Err(ScanError::EndOfStream)));
    }

    #[tokio::test]
    async fn scan_reads_across_partial_writes() {
        let (mut tx, rx) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for chunk in ["@display-name=ナ", "ルト :nick!nick@h PRIV", "MSG #a :hé", "llo\r", "\n"] {
                tx.write_all(chunk.as_bytes()).await.unwrap();
                tokio::task::yield_now().await;
            }
        });
        let msg = Scanner::new(rx).scan().await.unwrap();
        writer.await.unwrap();
        assert_eq!(msg.tag("display-name"), Some("ナルト"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, params(&["#a", "héllo"]));
    }

    #[tokio::test]
    async fn decoded_message_reencodes_structurally() {
        for line in [
            ":tmi.twitch.tv 001 thewolfpack :Welcome, GLHF!",
            ":nick!nick@nick.tmi.twitch.tv PRIVMSG #chan :hello world",
            ":nick!nick@nick.tmi.twitch.tv JOIN #chan",
            "PING :tmi.twitch.tv",
        ] {
            let decoded = scan_one(&format!("{}\r\n", line)).await.unwrap();
            let again = scan_one(&format!("{}\r\n", decoded)).await.unwrap();
            assert_eq!(decoded, again);
        }
    }

    proptest! {
        #[test]
        fn middle_params_never_contain_spaces(
            words in prop::collection::vec("[a-z#0-9]{1,10}", 1..8),
            trailing in "[a-z ]{0,40}",
        ) {
            let line = format!("CMD {} :{}\r\n", words.join(" "), trailing);
            let msg = block_on(scan_one(&line)).unwrap();
            let (last, middle) = msg.params.split_last().unwrap();
            prop_assert_eq!(middle.len(), words.len());
            for param in middle {
                prop_assert!(!param.contains(' '));
            }
            prop_assert_eq!(last, &trailing);
        }

        #[test]
        fn duplicate_tag_keys_keep_last_value(
            key in "[a-z-]{1,12}",
            values in prop::collection::vec("[a-zA-Z0-9]{1,8}", 1..6),
        ) {
            let tags: Vec<String> = values.iter().map(|v| format!("{}={}", key, v)).collect();
            let line = format!("@{} CMD\r\n", tags.join(";"));
            let msg = block_on(scan_one(&line)).unwrap();
            prop_assert_eq!(msg.tag(&key), values.last().map(String::as_str));
        }
    }
}
