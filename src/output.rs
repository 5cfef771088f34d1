//! Writing solution frames to disk.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OutputError;
use crate::solution::SolverState;




/// On-disk encoding of a frame.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Cbor,
    MessagePack,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Cbor => "cbor",
            OutputFormat::MessagePack => "msgpack",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cbor" => Ok(OutputFormat::Cbor),
            "msgpack" | "messagepack" => Ok(OutputFormat::MessagePack),
            other => Err(format!("unknown output format '{}' (expected cbor or msgpack)", other)),
        }
    }
}




/**
 * Writes numbered frames `frameNNNN.<ext>` into a directory.
 */
#[derive(Clone, Debug)]
pub struct OutputWriter {
    dir: PathBuf,
    format: OutputFormat,
}




// ============================================================================
impl OutputWriter {

    /// Create the writer, and the output directory if it does not exist.
    ///
    pub fn new<P: AsRef<Path>>(dir: P, format: OutputFormat) -> Result<Self, OutputError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self { dir: dir.as_ref().to_path_buf(), format })
    }

    pub fn frame_path(&self, frame: usize) -> PathBuf {
        self.dir.join(format!("frame{:04}.{}", frame, self.format.extension()))
    }

    pub fn write_frame(&self, frame: usize, state: &SolverState) -> Result<PathBuf, OutputError> {
        let path = self.frame_path(frame);
        let mut writer = BufWriter::new(File::create(&path)?);

        match self.format {
            OutputFormat::Cbor => {
                ciborium::ser::into_writer(state, &mut writer).map_err(|e| OutputError::Encode(e.to_string()))?
            }
            OutputFormat::MessagePack => {
                rmp_serde::encode::write_named(&mut writer, state).map_err(|e| OutputError::Encode(e.to_string()))?
            }
        }
        writer.flush()?;
        Ok(path)
    }

    pub fn read_frame(&self, frame: usize) -> Result<SolverState, OutputError> {
        let reader = BufReader::new(File::open(self.frame_path(frame))?);

        match self.format {
            OutputFormat::Cbor => ciborium::de::from_reader(reader).map_err(|e| OutputError::Decode(e.to_string())),
            OutputFormat::MessagePack => rmp_serde::decode::from_read(reader).map_err(|e| OutputError::Decode(e.to_string())),
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{OutputFormat, OutputWriter};

    #[test]
    fn formats_parse_from_their_names() {
        assert_eq!("cbor".parse::<OutputFormat>(), Ok(OutputFormat::Cbor));
        assert_eq!("msgpack".parse::<OutputFormat>(), Ok(OutputFormat::MessagePack));
        assert!("hdf5".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn frames_are_numbered() {
        let dir = std::env::temp_dir().join("peanoclaw-output-names");
        let writer = OutputWriter::new(&dir, OutputFormat::MessagePack).unwrap();
        assert_eq!(writer.frame_path(7), dir.join("frame0007.msgpack"));
    }
}
