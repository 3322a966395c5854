// src/tui/mod.rs
use crate::core::navigation::Surface;
use crate::core::orders::DraftField;
use crate::core::session::{Command, Session, SessionEvent};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, thread, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod ui;

/// Карточек в строке сетки (стрелки вверх/вниз прыгают на строку).
pub const GRID_COLUMNS: usize = 4;

/// Куда уходит строка ввода по Enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTarget {
    Symbol,
    Draft(DraftField),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputLine {
    pub target: InputTarget,
    pub buffer: String,
}

/// Terminal-local state that is not part of the session: the input line
/// (symbol or order ticket field) and whether it needs a redraw.
#[derive(Debug, Default)]
pub struct App {
    pub input: Option<InputLine>,
    dirty: bool,
}

impl App {
    /// Maps a key press to a session command for the active surface.
    pub fn on_key(&mut self, key: KeyEvent, active: Surface) -> Option<Command> {
        self.dirty = true;

        if let Some(line) = self.input.as_mut() {
            let target = line.target;
            return match key.code {
                KeyCode::Esc => {
                    self.input = None;
                    None
                }
                KeyCode::Enter => self.input.take().map(|line| match target {
                    InputTarget::Symbol => Command::AddSymbol(line.buffer),
                    InputTarget::Draft(field) => Command::EditDraft(field, line.buffer),
                }),
                KeyCode::Tab if target == InputTarget::Symbol => self
                    .input
                    .take()
                    .map(|line| Command::SearchSymbols(line.buffer)),
                KeyCode::Backspace => {
                    line.buffer.pop();
                    None
                }
                KeyCode::Char(c) => {
                    match target {
                        InputTarget::Symbol if !c.is_whitespace() => {
                            line.buffer.push(c.to_ascii_uppercase())
                        }
                        // Минус пропускаем: отрицательный SL/TP отклонит валидация
                        InputTarget::Draft(_) if c.is_ascii_digit() || matches!(c, '.' | '-') => {
                            line.buffer.push(c)
                        }
                        _ => {}
                    }
                    None
                }
                _ => None,
            };
        }

        match (active, key.code) {
            (_, KeyCode::Char('q')) => Some(Command::Quit),

            (Surface::Workspace, KeyCode::Esc) => Some(Command::CloseWorkspace),
            (Surface::Workspace, KeyCode::Char('t')) => Some(Command::CycleTimeframe),
            (Surface::Workspace, KeyCode::Char('k')) => Some(Command::CycleOrderKind),
            (Surface::Workspace, KeyCode::Up) => Some(Command::AdjustVolume(1)),
            (Surface::Workspace, KeyCode::Down) => Some(Command::AdjustVolume(-1)),
            (Surface::Workspace, KeyCode::Enter) => Some(Command::SubmitOrder),
            (Surface::Workspace, KeyCode::Char('z')) => Some(Command::Analyze),
            (Surface::Workspace, KeyCode::Char('P')) => {
                self.edit(InputTarget::Draft(DraftField::Price))
            }
            (Surface::Workspace, KeyCode::Char('S')) => {
                self.edit(InputTarget::Draft(DraftField::StopLoss))
            }
            (Surface::Workspace, KeyCode::Char('T')) => {
                self.edit(InputTarget::Draft(DraftField::TakeProfit))
            }

            (Surface::Grid, KeyCode::Left) => Some(Command::MoveCursor(-1)),
            (Surface::Grid, KeyCode::Right) => Some(Command::MoveCursor(1)),
            (Surface::Grid, KeyCode::Up) => Some(Command::MoveCursor(-(GRID_COLUMNS as i64))),
            (Surface::Grid, KeyCode::Down) => Some(Command::MoveCursor(GRID_COLUMNS as i64)),
            (Surface::Grid, KeyCode::Enter) => Some(Command::OpenWorkspace(None)),
            (Surface::Grid, KeyCode::Char('/')) => self.edit(InputTarget::Symbol),

            (Surface::Positions, KeyCode::Up) => Some(Command::MoveCursor(-1)),
            (Surface::Positions, KeyCode::Down) => Some(Command::MoveCursor(1)),
            (Surface::Positions, KeyCode::Char('x')) => Some(Command::ClosePosition),
            (Surface::Positions, KeyCode::Char('e')) => Some(Command::BreakEven),

            (Surface::Analytics, KeyCode::Char('r')) => Some(Command::Show(Surface::Analytics)),

            (Surface::Grid | Surface::Workspace, KeyCode::Char('c')) => Some(Command::PopoutChart),
            (Surface::Grid | Surface::Workspace, KeyCode::Char('i')) => Some(Command::PopoutInfo),

            (_, KeyCode::Esc) | (_, KeyCode::Char('g')) => Some(Command::Show(Surface::Grid)),
            (_, KeyCode::Char('p')) => Some(Command::Show(Surface::Positions)),
            (_, KeyCode::Char('a')) => Some(Command::Show(Surface::Analytics)),
            _ => None,
        }
    }

    fn edit(&mut self, target: InputTarget) -> Option<Command> {
        self.input = Some(InputLine {
            target,
            buffer: String::new(),
        });
        None
    }

    fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

/// Читает клавиатуру в отдельном потоке: crossterm блокирующий.
fn spawn_key_reader(tx: mpsc::Sender<KeyEvent>, cancel: CancellationToken) {
    thread::spawn(move || {
        while !cancel.is_cancelled() {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => break,
            }
            if let Ok(Event::Key(key)) = event::read() {
                if key.kind == KeyEventKind::Press && tx.blocking_send(key).is_err() {
                    break;
                }
            }
        }
        debug!("Key reader stopped");
    });
}

pub async fn run(
    mut session: Session,
    mut events: mpsc::Receiver<SessionEvent>,
    frame_interval: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (key_tx, mut keys) = mpsc::channel(32);
    spawn_key_reader(key_tx, cancel.clone());

    let mut app = App {
        dirty: true,
        ..Default::default()
    };
    let mut frames = tokio::time::interval(frame_interval);

    session.start();

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            Some(event) = events.recv() => session.handle(event),
            Some(key) = keys.recv() => {
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    session.handle(SessionEvent::Command(Command::Quit));
                } else if let Some(command) = app.on_key(key, session.nav().active()) {
                    session.handle(SessionEvent::Command(command));
                }
            }
            _ = frames.tick() => {
                let session_dirty = session.take_dirty();
                if app.take_dirty() || session_dirty {
                    if let Err(e) = terminal.draw(|f| ui::draw(f, &session, &app)) {
                        break Err(e.into());
                    }
                }
            }
        }

        if !session.is_running() {
            break Ok(());
        }
    };

    info!("Terminal session closing");
    session.shutdown();
    cancel.cancel();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn keys_map_per_surface() {
        let mut app = App::default();
        assert_eq!(
            app.on_key(key(KeyCode::Enter), Surface::Grid),
            Some(Command::OpenWorkspace(None))
        );
        assert_eq!(
            app.on_key(key(KeyCode::Enter), Surface::Workspace),
            Some(Command::SubmitOrder)
        );
        assert_eq!(
            app.on_key(key(KeyCode::Esc), Surface::Workspace),
            Some(Command::CloseWorkspace)
        );
        assert_eq!(
            app.on_key(key(KeyCode::Esc), Surface::Positions),
            Some(Command::Show(Surface::Grid))
        );
        assert_eq!(
            app.on_key(key(KeyCode::Down), Surface::Grid),
            Some(Command::MoveCursor(GRID_COLUMNS as i64))
        );
    }

    #[test]
    fn input_line_adds_or_searches() {
        let mut app = App::default();
        assert_eq!(app.on_key(key(KeyCode::Char('/')), Surface::Grid), None);
        for c in "gbpx".chars() {
            app.on_key(key(KeyCode::Char(c)), Surface::Grid);
        }
        app.on_key(key(KeyCode::Backspace), Surface::Grid);
        assert_eq!(app.input.as_ref().map(|l| l.buffer.as_str()), Some("GBP"));
        assert_eq!(
            app.on_key(key(KeyCode::Tab), Surface::Grid),
            Some(Command::SearchSymbols("GBP".to_string()))
        );
        assert!(app.input.is_none());

        // 'q' внутри строки ввода не выходит из программы
        app.on_key(key(KeyCode::Char('/')), Surface::Grid);
        app.on_key(key(KeyCode::Char('q')), Surface::Grid);
        assert_eq!(
            app.on_key(key(KeyCode::Enter), Surface::Grid),
            Some(Command::AddSymbol("Q".to_string()))
        );
    }

    #[test]
    fn ticket_fields_are_typed_in_workspace() {
        let mut app = App::default();
        assert_eq!(app.on_key(key(KeyCode::Char('S')), Surface::Workspace), None);
        for c in "1.07a00".chars() {
            app.on_key(key(KeyCode::Char(c)), Surface::Workspace);
        }
        assert_eq!(
            app.on_key(key(KeyCode::Enter), Surface::Workspace),
            Some(Command::EditDraft(DraftField::StopLoss, "1.0700".to_string()))
        );

        // Tab не ищет символы из поля цены, Esc отменяет ввод
        app.on_key(key(KeyCode::Char('P')), Surface::Workspace);
        assert_eq!(app.on_key(key(KeyCode::Tab), Surface::Workspace), None);
        assert_eq!(app.on_key(key(KeyCode::Esc), Surface::Workspace), None);
        assert!(app.input.is_none());
        assert_eq!(
            app.on_key(key(KeyCode::Enter), Surface::Workspace),
            Some(Command::SubmitOrder)
        );
    }
}
