//! Zeilen-Framing fuer Frames ueber TCP
//!
//! Der Decoder trennt am `\n`, kommt mit beliebig zerteilten oder
//! zusammengefassten Reads zurecht und liefert pro Zeile ein [`Dekodiert`].
//! Ungueltige Zeilen werden als `Verworfen` gemeldet statt die Verbindung
//! abzubrechen. Nur eine Zeile ueber [`MAX_ZEILEN_LAENGE`] ist ein
//! Transportfehler.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{zeile_dekodieren, Dekodiert, Frame};

/// Maximale Zeilenlaenge ohne Zeilenende: 1 MiB
pub const MAX_ZEILEN_LAENGE: usize = 1024 * 1024;

const ZEILENENDE: u8 = b'\n';

/// tokio-util Codec fuer newline-getrennte JSON-Frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_zeilen_laenge: usize,
    /// Ab hier wird beim naechsten `decode` nach `\n` gesucht
    naechster_index: usize,
}

impl FrameCodec {
    /// Erstellt einen Codec mit der Standard-Maximallaenge
    pub fn new() -> Self {
        Self::with_max_size(MAX_ZEILEN_LAENGE)
    }

    pub fn with_max_size(max_zeilen_laenge: usize) -> Self {
        Self {
            max_zeilen_laenge,
            naechster_index: 0,
        }
    }

    pub fn max_zeilen_laenge(&self) -> usize {
        self.max_zeilen_laenge
    }

    /// Prueft ob `frame` kodiert in eine Zeile passt
    ///
    /// Dieselbe Grenze, an der `encode` abbricht.
    pub fn passt(&self, frame: &Frame) -> bool {
        serde_json::to_vec(frame)
            .map(|json| json.len() <= self.max_zeilen_laenge)
            .unwrap_or(false)
    }

    fn zu_lang(&self, laenge: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Zeile zu lang: {} Bytes (max {})",
                laenge, self.max_zeilen_laenge
            ),
        )
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Dekodiert;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let start = self.naechster_index.min(src.len());
        match src[start..].iter().position(|b| *b == ZEILENENDE) {
            Some(offset) => {
                let ende = start + offset;
                self.naechster_index = 0;
                if ende > self.max_zeilen_laenge {
                    return Err(self.zu_lang(ende));
                }
                let zeile = src.split_to(ende + 1);
                Ok(Some(zeile_dekodieren(&zeile[..ende]).into()))
            }
            None if src.len() > self.max_zeilen_laenge => Err(self.zu_lang(src.len())),
            None => {
                self.naechster_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Letzte Zeile ohne abschliessendes `\n`
        let rest = src.split();
        self.naechster_index = 0;
        Ok(Some(zeile_dekodieren(&rest).into()))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&frame).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;
        if json.len() > self.max_zeilen_laenge {
            return Err(self.zu_lang(json.len()));
        }
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(ZEILENENDE);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{frame_kodieren, FrameFehler};
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn dekodiere_alles(codec: &mut FrameCodec, buf: &mut BytesMut) -> Vec<Dekodiert> {
        let mut items = Vec::new();
        while let Some(item) = codec.decode(buf).unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn zusammengefasste_zeilen() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(
            &b"{\"type\":\"join\",\"name\":\"A\"}\n{\"type\":\"leave\"}\n"[..],
        );
        let items = dekodiere_alles(&mut codec, &mut buf);
        assert_eq!(
            items,
            vec![
                Dekodiert::Frame(Frame::join("A")),
                Dekodiert::Frame(Frame::Leave)
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn zerteilte_zeile_byteweise() {
        let zeile = frame_kodieren(&Frame::nachricht("Alice", "aGVsbG8=")).unwrap();
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let mut ergebnis = Vec::new();
        for byte in zeile {
            buf.put_u8(byte);
            if let Some(item) = codec.decode(&mut buf).unwrap() {
                ergebnis.push(item);
            }
        }
        assert_eq!(
            ergebnis,
            vec![Dekodiert::Frame(Frame::nachricht("Alice", "aGVsbG8="))]
        );
    }

    #[test]
    fn muell_zeile_wird_verworfen_danach_geht_es_weiter() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"kein json\n{\"type\":\"close\"}\n"[..]);
        let items = dekodiere_alles(&mut codec, &mut buf);
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[0],
            Dekodiert::Verworfen(FrameFehler::Json(_))
        ));
        assert_eq!(items[1], Dekodiert::Frame(Frame::Close));
    }

    #[test]
    fn unbekannter_typ_wird_verworfen() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"type\":\"ping\"}\n"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Dekodiert::Verworfen(FrameFehler::UnbekannterTyp(
                "ping".into()
            )))
        );
    }

    #[test]
    fn letzte_zeile_ohne_zeilenende() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"type\":\"leave\"}"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(Dekodiert::Frame(Frame::Leave))
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn zu_lange_zeile_ist_transportfehler() {
        let mut codec = FrameCodec::with_max_size(16);
        let mut buf = BytesMut::from(&[b'x'; 17][..]);
        let fehler = codec.decode(&mut buf).unwrap_err();
        assert_eq!(fehler.kind(), io::ErrorKind::InvalidData);

        let mut codec = FrameCodec::with_max_size(16);
        let mut buf = BytesMut::from(&b"{\"type\":\"server_close\"}\n"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn passt_entspricht_encoder_grenze() {
        let mut codec = FrameCodec::with_max_size(40);
        let klein = Frame::nachricht("A", "aGk=");
        let gross = Frame::nachricht("A", "x".repeat(64));

        assert!(codec.passt(&klein));
        assert!(!codec.passt(&gross));

        let mut buf = BytesMut::new();
        assert!(codec.encode(klein, &mut buf).is_ok());
        assert!(codec.encode(gross, &mut buf).is_err());
    }

    #[test]
    fn encoder_haengt_zeilenende_an() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::Close, &mut buf).unwrap();
        assert_eq!(&buf[..], b"{\"type\":\"close\"}\n");
    }

    #[tokio::test]
    async fn framed_ueber_duplex() {
        let (links, rechts) = tokio::io::duplex(64);
        let mut schreiber = FramedWrite::new(links, FrameCodec::new());
        let mut leser = FramedRead::new(rechts, FrameCodec::new());

        schreiber.send(Frame::salt("c2FsdA==")).await.unwrap();
        schreiber.send(Frame::join("Bob")).await.unwrap();
        drop(schreiber);

        assert_eq!(
            leser.next().await.unwrap().unwrap(),
            Dekodiert::Frame(Frame::salt("c2FsdA=="))
        );
        assert_eq!(
            leser.next().await.unwrap().unwrap(),
            Dekodiert::Frame(Frame::join("Bob"))
        );
        assert!(leser.next().await.is_none());
    }

    #[tokio::test]
    async fn eof_mitten_in_zeile_liefert_rest() {
        let (mut links, rechts) = tokio::io::duplex(64);
        let mut leser = FramedRead::new(rechts, FrameCodec::new());

        links.write_all(b"{\"type\":\"cl").await.unwrap();
        links.write_all(b"ose\"}").await.unwrap();
        drop(links);

        assert_eq!(
            leser.next().await.unwrap().unwrap(),
            Dekodiert::Frame(Frame::Close)
        );
        assert!(leser.next().await.is_none());
    }
}
