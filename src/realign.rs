
use bio::io::fasta;
use log::{debug, trace};
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::consensus::GAP_CHAR;

/// How often we poll a running aligner for completion
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(thiserror::Error, Debug)]
pub enum RealignError {
    #[error("failed to launch aligner {command:?}: {source}")]
    LaunchFailure { command: String, source: std::io::Error },
    #[error("aligner I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("aligner exited with {status}: {stderr}")]
    NonZeroExit { status: ExitStatus, stderr: String },
    #[error("aligner did not finish within {seconds} seconds and was killed")]
    Timeout { seconds: u64 },
    #[error("failed to parse aligner output: {message}")]
    OutputParse { message: String }
}

/// Boundary for turning a set of unequal-length sample strings into an equal-length,
/// gap-padded set.
pub trait Realigner {
    /// Aligns the given (sample, sequence) pairs.
    /// Implementations must return one entry per output sequence; callers map the results
    /// back into their own keyspace and handle samples the aligner dropped.
    /// # Arguments
    /// * `column` - the (sample, sequence) pairs to align, minimum one entry
    fn realign(&self, column: &[(String, String)]) -> Result<Vec<(String, String)>, RealignError>;
}

/// Invokes an external multi-sequence aligner as a subprocess: FASTA in via stdin,
/// aligned FASTA out via stdout. The call is bounded by a timeout; a hung aligner is
/// killed and reported as a typed failure rather than blocking the region forever.
pub struct SubprocessRealigner {
    /// The aligner executable
    command: String,
    /// Arguments passed to the executable
    args: Vec<String>,
    /// Maximum wall time for one invocation
    timeout: Duration
}

impl SubprocessRealigner {
    /// # Arguments
    /// * `command` - the aligner executable, e.g. "clustalo"
    /// * `args` - arguments that make it read FASTA on stdin and write aligned FASTA on stdout
    /// * `timeout` - maximum wall time for one invocation
    pub fn new(command: String, args: Vec<String>, timeout: Duration) -> SubprocessRealigner {
        SubprocessRealigner {
            command,
            args,
            timeout
        }
    }

    /// Waits for the child to exit, polling up to the configured timeout.
    /// Returns `None` if the timeout elapsed with the child still running.
    fn wait_bounded(&self, child: &mut Child) -> Result<Option<ExitStatus>, std::io::Error> {
        let start_time: Instant = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if start_time.elapsed() >= self.timeout {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Realigner for SubprocessRealigner {
    fn realign(&self, column: &[(String, String)]) -> Result<Vec<(String, String)>, RealignError> {
        assert!(!column.is_empty());

        // the aligner receives equal-length input even though the sequences semantically differ
        let max_len: usize = column.iter().map(|(_sample, seq)| seq.len()).max().unwrap();
        let mut fasta_input: Vec<u8> = vec![];
        {
            let mut fasta_writer = fasta::Writer::new(&mut fasta_input);
            for (sample, sequence) in column.iter() {
                let mut padded: String = sequence.clone();
                while padded.len() < max_len {
                    padded.push(GAP_CHAR);
                }
                fasta_writer.write(sample, None, padded.as_bytes())?;
            }
            fasta_writer.flush()?;
        }
        trace!("Aligner input:\n{}", String::from_utf8_lossy(&fasta_input));

        let mut child: Child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RealignError::LaunchFailure { command: self.command.clone(), source })?;

        // the output pipes must be drained while we poll, a full pipe buffer would
        // otherwise block the child until it gets mistaken for a timeout
        let mut child_stdout = child.stdout.take().expect("stdout was piped");
        let stdout_thread = std::thread::spawn(move || -> Result<Vec<u8>, std::io::Error> {
            let mut buffer: Vec<u8> = vec![];
            child_stdout.read_to_end(&mut buffer)?;
            Ok(buffer)
        });
        let mut child_stderr = child.stderr.take().expect("stderr was piped");
        let stderr_thread = std::thread::spawn(move || -> Vec<u8> {
            let mut buffer: Vec<u8> = vec![];
            let _ = child_stderr.read_to_end(&mut buffer);
            buffer
        });

        // per-position columns are tiny on the input side, so writing stdin up front cannot stall
        {
            let mut child_stdin = child.stdin.take().expect("stdin was piped");
            match child_stdin.write_all(&fasta_input) {
                Ok(()) => {},
                // a crashed aligner closes its end early, let the exit status tell the story
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {},
                Err(e) => {
                    return Err(RealignError::Io(e));
                }
            };
        }

        let status: ExitStatus = match self.wait_bounded(&mut child)? {
            Some(status) => status,
            None => {
                debug!("Aligner timed out, killing subprocess...");
                // killing the child closes the pipes, so the reader threads unblock on their own
                child.kill()?;
                child.wait()?;
                return Err(RealignError::Timeout { seconds: self.timeout.as_secs() });
            }
        };

        let stdout_bytes: Vec<u8> = stdout_thread.join()
            .expect("stdout reader thread panicked")?;
        if !status.success() {
            let stderr_bytes: Vec<u8> = stderr_thread.join()
                .expect("stderr reader thread panicked");
            let stderr: String = String::from_utf8_lossy(&stderr_bytes).trim().to_string();
            return Err(RealignError::NonZeroExit { status, stderr });
        }

        parse_aligned_fasta(&stdout_bytes)
    }
}

/// Parses aligned FASTA bytes into (id, sequence) pairs in output order.
/// # Arguments
/// * `aligned_bytes` - the raw stdout of the aligner
/// # Errors
/// * if the bytes are not parseable FASTA, contain non-utf8 sequence, or contain no records
pub fn parse_aligned_fasta(aligned_bytes: &[u8]) -> Result<Vec<(String, String)>, RealignError> {
    let fasta_reader = fasta::Reader::new(aligned_bytes);
    let mut aligned: Vec<(String, String)> = vec![];
    for entry in fasta_reader.records() {
        let record: fasta::Record = match entry {
            Ok(r) => r,
            Err(e) => {
                return Err(RealignError::OutputParse { message: e.to_string() });
            }
        };
        let sequence: String = match std::str::from_utf8(record.seq()) {
            Ok(s) => s.to_string(),
            Err(e) => {
                return Err(RealignError::OutputParse { message: e.to_string() });
            }
        };
        aligned.push((record.id().to_string(), sequence));
    }
    if aligned.is_empty() {
        return Err(RealignError::OutputParse { message: "no records in aligner output".to_string() });
    }
    Ok(aligned)
}
