// src/core/navigation.rs
use crate::types::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Grid,
    Workspace,
    Positions,
    Analytics,
}

impl Surface {
    pub fn title(&self) -> &'static str {
        match self {
            Surface::Grid => "Dashboard",
            Surface::Workspace => "Workspace",
            Surface::Positions => "Positions",
            Surface::Analytics => "Analytics",
        }
    }
}

/// Активная поверхность + выбранный символ. Переходы только по явной навигации.
#[derive(Debug, Clone)]
pub struct Navigator {
    active: Surface,
    selected: Option<String>,
    timeframe: Timeframe,
}

impl Navigator {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            active: Surface::Grid,
            selected: None,
            timeframe,
        }
    }

    pub fn active(&self) -> Surface {
        self.active
    }

    pub fn is_visible(&self, surface: Surface) -> bool {
        self.active == surface
    }

    /// Symbol of the open workspace, if any.
    pub fn selected(&self) -> Option<&str> {
        match self.active {
            Surface::Workspace => self.selected.as_deref(),
            _ => None,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Grid / Positions / Analytics. The workspace is a modal panel: while it
    /// is open these switches are ignored. Re-entering the active surface is
    /// allowed and forces a repaint.
    pub fn show(&mut self, target: Surface) -> bool {
        if target == Surface::Workspace || self.active == Surface::Workspace {
            return false;
        }
        self.active = target;
        true
    }

    /// Без символа вход в workspace не делает ничего.
    pub fn open_workspace(&mut self, symbol: Option<&str>) -> bool {
        match symbol.filter(|s| !s.is_empty()) {
            Some(symbol) => {
                self.selected = Some(symbol.to_string());
                self.active = Surface::Workspace;
                true
            }
            None => false,
        }
    }

    pub fn close_workspace(&mut self) -> bool {
        if self.active != Surface::Workspace {
            return false;
        }
        self.selected = None;
        self.active = Surface::Grid;
        true
    }

    pub fn cycle_timeframe(&mut self) -> Option<Timeframe> {
        if self.active != Surface::Workspace {
            return None;
        }
        self.timeframe = self.timeframe.next();
        Some(self.timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_requires_a_symbol() {
        let mut nav = Navigator::new(Timeframe::M5);
        assert!(!nav.open_workspace(None));
        assert!(!nav.open_workspace(Some("")));
        assert_eq!(nav.active(), Surface::Grid);

        assert!(nav.open_workspace(Some("EURUSD")));
        assert_eq!(nav.selected(), Some("EURUSD"));
    }

    #[test]
    fn leaving_workspace_returns_to_grid_and_clears_selection() {
        let mut nav = Navigator::new(Timeframe::M5);
        nav.show(Surface::Positions);
        nav.open_workspace(Some("XAUUSD"));

        assert!(!nav.show(Surface::Analytics));
        assert!(nav.close_workspace());
        assert_eq!(nav.active(), Surface::Grid);
        assert_eq!(nav.selected(), None);
        assert!(!nav.close_workspace());
    }

    #[test]
    fn timeframe_only_cycles_inside_workspace() {
        let mut nav = Navigator::new(Timeframe::M5);
        assert_eq!(nav.cycle_timeframe(), None);
        nav.open_workspace(Some("XAUUSD"));
        assert_eq!(nav.cycle_timeframe(), Some(Timeframe::M15));
    }
}
