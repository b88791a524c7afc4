use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, RotError};
use crate::parity::ParityService;
use crate::parity::layout::ParityLayout;
use crate::parity::mirror::MirrorParity;
use crate::parity::par2::Par2Parity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Par2,
    Mirror,
}

impl FromStr for Backend {
    type Err = RotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "par2" => Ok(Backend::Par2),
            "mirror" => Ok(Backend::Mirror),
            other => Err(RotError::Config(format!(
                "PARITY_BACKEND must be par2 or mirror, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Par2 => f.write_str("par2"),
            Backend::Mirror => f.write_str("mirror"),
        }
    }
}

pub fn open_parity(
    backend: Backend,
    layout: ParityLayout,
    timeout: Duration,
) -> Result<Box<dyn ParityService>> {
    match backend {
        Backend::Par2 => {
            let svc = Par2Parity::new(layout, timeout);
            svc.probe()?;
            Ok(Box::new(svc))
        }
        Backend::Mirror => Ok(Box::new(MirrorParity::new(layout))),
    }
}
