//! Entrada de FeatureFrames desde el proveedor de landmarks.
//!
//! En vivo: una línea JSON por frame (`null` si no hay cara) leída en un hilo
//! aparte que alimenta un canal acotado. Sesiones grabadas: CSV con una fila
//! por frame.

use std::io::BufRead;
use std::path::Path;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use crossbeam_channel::Sender;
use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::{info, warn};

use crate::types::{FeatureFrame, HeadLandmarks, MouthLandmarks, Point};

/// Interpreta una línea JSON. `Ok(None)` indica frame sin cara.
pub fn parse_frame_line(line: &str) -> Result<Option<FeatureFrame>, serde_json::Error> {
    serde_json::from_str(line)
}

/// Lanza un hilo que lee frames JSON línea a línea y los envía por `tx`.
/// Termina al llegar a EOF o cuando el receptor desaparece.
pub fn spawn_jsonl_reader<R>(reader: R, tx: Sender<Option<FeatureFrame>>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        let mut malformed = 0usize;
        for (line_idx, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Error leyendo frames: {}", e);
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_frame_line(trimmed) {
                Ok(frame) => {
                    if tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    malformed += 1;
                    warn!("Línea {} descartada: {}", line_idx + 1, e);
                }
            }
        }
        info!("Fin de la entrada de frames ({} líneas inválidas)", malformed);
    })
}

/// Fila de una sesión grabada. `face = false` marca un frame sin cara.
#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp_s: f64,
    #[serde(default = "default_face")]
    face: bool,
    #[serde(default = "default_confidence")]
    confidence: f32,
    frame_width: f32,
    frame_height: f32,
    left_ear: f32,
    right_ear: f32,
    left_eye_x: f32,
    left_eye_y: f32,
    right_eye_x: f32,
    right_eye_y: f32,
    nose_x: f32,
    nose_y: f32,
    left_edge_x: f32,
    left_edge_y: f32,
    right_edge_x: f32,
    right_edge_y: f32,
    forehead_x: f32,
    forehead_y: f32,
    chin_x: f32,
    chin_y: f32,
    mouth_top_x: f32,
    mouth_top_y: f32,
    mouth_bottom_x: f32,
    mouth_bottom_y: f32,
    mouth_left_x: f32,
    mouth_left_y: f32,
    mouth_right_x: f32,
    mouth_right_y: f32,
    #[serde(default)]
    brow_raised: bool,
}

fn default_face() -> bool {
    true
}

fn default_confidence() -> f32 {
    1.0
}

impl CsvRow {
    fn into_frame(self) -> Option<FeatureFrame> {
        if !self.face {
            return None;
        }
        Some(FeatureFrame {
            timestamp_s: self.timestamp_s,
            confidence: self.confidence,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            left_ear: self.left_ear,
            right_ear: self.right_ear,
            left_eye_center: Point::new(self.left_eye_x, self.left_eye_y),
            right_eye_center: Point::new(self.right_eye_x, self.right_eye_y),
            head: HeadLandmarks {
                nose_tip: Point::new(self.nose_x, self.nose_y),
                left_face_edge: Point::new(self.left_edge_x, self.left_edge_y),
                right_face_edge: Point::new(self.right_edge_x, self.right_edge_y),
                forehead: Point::new(self.forehead_x, self.forehead_y),
                chin: Point::new(self.chin_x, self.chin_y),
            },
            mouth: MouthLandmarks {
                top: Point::new(self.mouth_top_x, self.mouth_top_y),
                bottom: Point::new(self.mouth_bottom_x, self.mouth_bottom_y),
                left: Point::new(self.mouth_left_x, self.mouth_left_y),
                right: Point::new(self.mouth_right_x, self.mouth_right_y),
            },
            brow_raised: self.brow_raised,
        })
    }
}

/// Carga una sesión grabada. Cada elemento es un frame o `None` si no hubo cara.
pub fn load_frames_from_csv(path: impl AsRef<Path>) -> Result<Vec<Option<FeatureFrame>>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut frames = Vec::new();
    for (row_idx, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        frames.push(row.into_frame());
    }

    if frames.is_empty() {
        bail!("El CSV {:?} no contiene datos", path);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::io::Cursor;

    const HEADER: &str = "timestamp_s,face,confidence,frame_width,frame_height,left_ear,right_ear,\
left_eye_x,left_eye_y,right_eye_x,right_eye_y,nose_x,nose_y,left_edge_x,left_edge_y,\
right_edge_x,right_edge_y,forehead_x,forehead_y,chin_x,chin_y,mouth_top_x,mouth_top_y,\
mouth_bottom_x,mouth_bottom_y,mouth_left_x,mouth_left_y,mouth_right_x,mouth_right_y,brow_raised";

    fn row(t: f64, face: bool, left_ear: f32) -> String {
        format!(
            "{},{},0.9,640,480,{},0.3,320,240,320,240,0.5,0.5,0.3,0.5,0.7,0.5,0.5,0.2,0.5,0.8,\
0.5,0.70,0.5,0.71,0.47,0.705,0.53,0.705,false",
            t, face, left_ear
        )
    }

    #[test]
    fn json_line_null_means_no_face() {
        assert_eq!(parse_frame_line("null").unwrap(), None);
        let json = serde_json::to_string(&FeatureFrame::default()).unwrap();
        assert_eq!(parse_frame_line(&json).unwrap(), Some(FeatureFrame::default()));
        assert!(parse_frame_line("{\"timestamp_s\": 1.0}").is_err());
    }

    #[test]
    fn reader_thread_skips_bad_lines() {
        let frame = FeatureFrame {
            timestamp_s: 2.5,
            ..FeatureFrame::default()
        };
        let input = format!(
            "{}\n\nno es json\nnull\n{}\n",
            serde_json::to_string(&FeatureFrame::default()).unwrap(),
            serde_json::to_string(&frame).unwrap()
        );
        let (tx, rx) = bounded(8);
        let handle = spawn_jsonl_reader(Cursor::new(input), tx);
        handle.join().unwrap();

        let received: Vec<_> = rx.iter().collect();
        assert_eq!(received.len(), 3);
        assert!(received[1].is_none());
        assert_eq!(received[2].unwrap().timestamp_s, 2.5);
    }

    #[test]
    fn csv_session_loads_frames_and_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sesion.csv");
        let content = format!(
            "{}\n{}\n{}\n{}\n",
            HEADER,
            row(0.0, true, 0.3),
            row(0.033, false, 0.3),
            row(0.066, true, 0.1)
        );
        std::fs::write(&path, content).unwrap();

        let frames = load_frames_from_csv(&path).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[1].is_none());
        let last = frames[2].unwrap();
        assert_eq!(last.left_ear, 0.1);
        assert_eq!(last.confidence, 0.9);
        assert_eq!(last.head.chin, Point::new(0.5, 0.8));
        assert!(last.is_well_formed());
    }

    #[test]
    fn empty_or_broken_csv_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("vacio.csv");
        std::fs::write(&empty, format!("{}\n", HEADER)).unwrap();
        assert!(load_frames_from_csv(&empty).is_err());

        let broken = dir.path().join("roto.csv");
        std::fs::write(&broken, format!("{}\n1.0,true,abc\n", HEADER)).unwrap();
        assert!(load_frames_from_csv(&broken).is_err());
        assert!(load_frames_from_csv(dir.path().join("no_existe.csv")).is_err());
    }
}
