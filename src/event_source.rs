//! Event source seam, so the full app loop can run against scripted
//! input in tests.

use std::time::Duration;

use anyhow::Result;
pub use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::event::{KeyEventKind, KeyEventState, MouseButton, MouseEvent, MouseEventKind};

pub trait EventSource {
    /// Poll for events with a timeout.
    fn poll(&mut self, timeout: Duration) -> Result<bool>;

    /// Read the next event.
    fn read(&mut self) -> Result<Event>;
}

/// Real terminal input via crossterm.
pub struct TerminalEventSource;

impl EventSource for TerminalEventSource {
    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        Ok(crossterm::event::poll(timeout)?)
    }

    fn read(&mut self) -> Result<Event> {
        Ok(crossterm::event::read()?)
    }
}

/// Scripted input for tests. Yields its events in order, then reports
/// no more input.
pub struct SimulatedEventSource {
    pub events: Vec<Event>,
    cursor: usize,
}

impl SimulatedEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events, cursor: 0 }
    }

    pub fn key_event(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::empty(),
        })
    }

    pub fn char_key(c: char) -> Event {
        Self::key_event(KeyCode::Char(c), KeyModifiers::empty())
    }

    pub fn ctrl_char_key(c: char) -> Event {
        Self::key_event(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::empty(),
        })
    }

    pub fn mouse_down(column: u16, row: u16) -> Event {
        Self::mouse(MouseEventKind::Down(MouseButton::Left), column, row)
    }

    pub fn mouse_drag(column: u16, row: u16) -> Event {
        Self::mouse(MouseEventKind::Drag(MouseButton::Left), column, row)
    }

    pub fn mouse_up(column: u16, row: u16) -> Event {
        Self::mouse(MouseEventKind::Up(MouseButton::Left), column, row)
    }
}

impl EventSource for SimulatedEventSource {
    fn poll(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(self.cursor < self.events.len())
    }

    fn read(&mut self) -> Result<Event> {
        let event = self
            .events
            .get(self.cursor)
            .cloned()
            .unwrap_or_else(|| Self::char_key('q'));
        self.cursor += 1;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_source_replays_in_order() {
        let mut source = SimulatedEventSource::new(vec![
            SimulatedEventSource::char_key('n'),
            SimulatedEventSource::mouse_down(10, 5),
            SimulatedEventSource::mouse_up(12, 7),
        ]);

        assert!(source.poll(Duration::ZERO).unwrap());
        assert!(matches!(source.read().unwrap(), Event::Key(k) if k.code == KeyCode::Char('n')));
        assert!(matches!(
            source.read().unwrap(),
            Event::Mouse(m) if m.kind == MouseEventKind::Down(MouseButton::Left)
        ));
        assert!(matches!(source.read().unwrap(), Event::Mouse(_)));
        assert!(!source.poll(Duration::ZERO).unwrap());
    }
}
