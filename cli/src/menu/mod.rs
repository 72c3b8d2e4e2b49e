//! Interactive operator menu

use protocol::Session;
use protocol::session::{parse_host, parse_key};
use std::io::{self, BufRead, Write};
use std::thread;
use tokio::sync::oneshot;

const HOST_HELP: &str = "IP address is invalid. Please set Host IP address.";
const KEY_HELP: &str = "Key value is invalid. Please set Key Value to an integer from 0 to 25.";

/// What the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Send,
    Receive,
    Quit,
}

/// Result of one prompt: the possibly updated session and the chosen action
pub type Answer = io::Result<(Session, MenuAction)>;

/// Run one prompt on its own thread
///
/// Blocking reads stay off the runtime, so the caller can keep listening for
/// Ctrl-C and return without waiting for the operator.
pub fn spawn_prompt<F, R, W>(open: F) -> oneshot::Receiver<Answer>
where
    F: FnOnce() -> Menu<R, W> + Send + 'static,
    R: BufRead,
    W: Write,
{
    let (reply, answer) = oneshot::channel();
    thread::spawn(move || {
        let mut menu = open();
        let result = menu.prompt().map(|action| (menu.session(), action));
        let _ = reply.send(result);
    });
    answer
}

/// Menu over any line-oriented input; invalid entries are reported and reprompted
pub struct Menu<R, W> {
    input: R,
    output: W,
    session: Session,
}

impl<R: BufRead, W: Write> Menu<R, W> {
    pub fn new(input: R, output: W, session: Session) -> Self {
        Self {
            input,
            output,
            session,
        }
    }

    pub fn session(&self) -> Session {
        self.session
    }

    /// Show the menu until the operator starts a path or quits
    ///
    /// End of input counts as quitting.
    pub fn prompt(&mut self) -> io::Result<MenuAction> {
        loop {
            writeln!(self.output)?;
            writeln!(
                self.output,
                "   1. Sender (host {}, key {})",
                self.session.host, self.session.key
            )?;
            writeln!(self.output, "   2. Receiver (key {})", self.session.key)?;
            writeln!(self.output, "   3. Set Host IP Address")?;
            writeln!(self.output, "   4. Set Key Value")?;
            writeln!(self.output, "   5. Quit")?;
            writeln!(self.output)?;

            let Some(choice) = self.read_line("Please choose an option: ")? else {
                return Ok(MenuAction::Quit);
            };
            writeln!(self.output)?;

            match choice.as_str() {
                "1" => return Ok(MenuAction::Send),
                "2" => return Ok(MenuAction::Receive),
                "3" => {
                    let Some(input) = self.read_line("Set Host IP: ")? else {
                        return Ok(MenuAction::Quit);
                    };
                    match parse_host(&input) {
                        Ok(host) => self.session.host = host,
                        Err(_) => writeln!(self.output, "{}", HOST_HELP)?,
                    }
                }
                "4" => {
                    let Some(input) = self.read_line("Set Key Value: ")? else {
                        return Ok(MenuAction::Quit);
                    };
                    match parse_key(&input) {
                        Ok(key) => self.session.key = key,
                        Err(_) => writeln!(self.output, "{}", KEY_HELP)?,
                    }
                }
                "5" => return Ok(MenuAction::Quit),
                _ => writeln!(self.output, "Invalid choice. Please try again.")?,
            }
        }
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn run(script: &str) -> (MenuAction, Session, String) {
        let mut output = Vec::new();
        let mut menu = Menu::new(script.as_bytes(), &mut output, Session::default());
        let action = menu.prompt().unwrap();
        let session = menu.session();
        (action, session, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_setters_update_session() {
        let (action, session, _) = run("3\n10.0.0.9\n4\n7\n1\n");
        assert_eq!(action, MenuAction::Send);
        assert_eq!(session.host, Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(session.key.value(), 7);
    }

    #[test]
    fn test_invalid_input_reprompts() {
        let (action, session, output) = run("4\n26\n3\nnot-an-ip\n9\n2\n");
        assert_eq!(action, MenuAction::Receive);
        assert_eq!(session, Session::default());
        assert!(output.contains(KEY_HELP));
        assert!(output.contains(HOST_HELP));
        assert!(output.contains("Invalid choice"));
    }

    #[tokio::test]
    async fn test_spawned_prompt_answers() {
        let answer = spawn_prompt(|| Menu::new(&b"4\n9\n2\n"[..], io::sink(), Session::default()));
        let (session, action) = answer.await.unwrap().unwrap();
        assert_eq!(action, MenuAction::Receive);
        assert_eq!(session.key.value(), 9);
    }

    #[test]
    fn test_quit_and_end_of_input() {
        assert_eq!(run("5\n").0, MenuAction::Quit);
        assert_eq!(run("").0, MenuAction::Quit);
        assert_eq!(run("3\n").0, MenuAction::Quit);
    }
}
