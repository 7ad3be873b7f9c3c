//! Operator streams of one invocation

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Input, output and error stream of the SSH channel
pub struct ReadWriter<R, W, E> {
    pub input: R,
    pub out: W,
    pub err_out: E,
}

/// Operator answer to a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

impl<R, W, E> ReadWriter<R, W, E>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    pub fn new(input: R, out: W, err_out: E) -> Self {
        Self {
            input,
            out,
            err_out,
        }
    }

    /// Read one line; empty string at end of input
    pub async fn read_line(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        self.input.read_line(&mut line).await?;
        Ok(line)
    }

    pub async fn write_out(&mut self, text: &str) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await
    }

    pub async fn write_err(&mut self, text: &str) -> std::io::Result<()> {
        self.err_out.write_all(text.as_bytes()).await?;
        self.err_out.flush().await
    }

    /// Print `question` and wait for the literal answer `yes`
    pub async fn confirm(&mut self, question: &str) -> std::io::Result<Confirmation> {
        self.write_out(&format!("{}\n", question)).await?;
        let answer = self.read_line().await?;
        Ok(if answer.trim() == "yes" {
            Confirmation::Confirmed
        } else {
            Confirmation::Declined
        })
    }
}
