//! Menu buttons of the current PCI: selection, activation and mouse hits.

use serde::Serialize;

use crate::nav::Btni;

use super::{Navigator, NavigatorError};

/// Which colour set of a button to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HighlightMode {
    Selection = 0,
    Action = 1,
}

/// Screen rectangle and colours of a highlighted button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightArea {
    pub button: u16,
    pub x_start: u16,
    pub x_end: u16,
    pub y_start: u16,
    pub y_end: u16,
    /// Colour and contrast nibbles, 0 when the button has no colour group.
    pub palette: u32,
    /// Presentation time the highlight starts at.
    pub pts: u32,
}

impl Navigator {
    pub fn current_button(&self) -> u16 {
        self.vm.registers().highlighted_button()
    }

    fn check_menu(&self) -> Result<(), NavigatorError> {
        if self.last_cmd_nav_lbn == Some(self.pci.pci_gi.nv_pck_lbn) {
            return Err(NavigatorError::MenuLeft);
        }
        if !self.pci.has_highlight() {
            return Err(NavigatorError::NoHighlight);
        }
        Ok(())
    }

    /// The highlighted button, moving the highlight to button 1 when it
    /// points past the buttons of this menu.
    fn current_btni(&mut self) -> Result<Btni, NavigatorError> {
        self.check_menu()?;
        let mut button = self.current_button();
        if button == 0 || button > u16::from(self.pci.button_count()) {
            tracing::debug!(target: "dvdnav::navigator", "highlighted button {} out of range, using 1", button);
            button = 1;
            self.vm.registers_mut().set_highlighted_button(button);
        }
        self.pci
            .button(usize::from(button))
            .copied()
            .ok_or(NavigatorError::NoSuchButton(button))
    }

    /// Highlights `button` without activating it.
    pub fn select_button(&mut self, button: u16) -> Result<(), NavigatorError> {
        self.check_menu()?;
        if button == 0 || button > u16::from(self.pci.button_count()) {
            return Err(NavigatorError::NoSuchButton(button));
        }
        self.vm.registers_mut().set_highlighted_button(button);
        Ok(())
    }

    /// Runs the command of the highlighted button. `true` when it jumped.
    ///
    /// In a still without buttons this leaves the still instead.
    pub fn activate_button(&mut self) -> Result<bool, NavigatorError> {
        let lbn = self.pci.pci_gi.nv_pck_lbn;
        if self.last_cmd_nav_lbn == Some(lbn) {
            return Err(NavigatorError::MenuLeft);
        }
        if !self.pci.has_highlight() {
            if self.current.still == 0 {
                return Err(NavigatorError::NoHighlight);
            }
            self.vm.get_next_cell()?;
            self.current.still = 0;
            self.sync_wait = false;
            self.last_cmd_nav_lbn = Some(lbn);
            return Ok(true);
        }

        let btn = self.current_btni()?;
        self.activate_command(btn.cmd)
    }

    /// Runs `cmd` as if it were the command of the highlighted button.
    pub fn activate_command(&mut self, cmd: u64) -> Result<bool, NavigatorError> {
        let jumped = self.vm.exec_cmd(cmd)?;
        if jumped {
            self.current.still = 0;
            self.last_cmd_nav_lbn = Some(self.pci.pci_gi.nv_pck_lbn);
        }
        Ok(jumped)
    }

    pub fn select_upper_button(&mut self) -> Result<(), NavigatorError> {
        self.move_highlight(|b| b.up)
    }

    pub fn select_lower_button(&mut self) -> Result<(), NavigatorError> {
        self.move_highlight(|b| b.down)
    }

    pub fn select_left_button(&mut self) -> Result<(), NavigatorError> {
        self.move_highlight(|b| b.left)
    }

    pub fn select_right_button(&mut self) -> Result<(), NavigatorError> {
        self.move_highlight(|b| b.right)
    }

    /// Follows a neighbour link and activates the new button if it is an
    /// auto action button. A zero link keeps the current button.
    fn move_highlight(&mut self, neighbour: impl Fn(&Btni) -> u8) -> Result<(), NavigatorError> {
        let target = neighbour(&self.current_btni()?);
        if target != 0 {
            self.select_button(u16::from(target))?;
        }
        if self.current_btni()?.auto_action_mode != 0 {
            self.activate_button()?;
        }
        Ok(())
    }

    /// Highlights the button under `(x, y)`. Overlapping buttons go to the
    /// one whose centre is nearest.
    pub fn mouse_select(&mut self, x: u16, y: u16) -> Result<u16, NavigatorError> {
        self.check_menu()?;
        let count = usize::from(self.pci.button_count());
        let best = self
            .pci
            .hli
            .btnit
            .iter()
            .take(count)
            .enumerate()
            .filter(|(_, b)| b.contains(x, y))
            .min_by_key(|(_, b)| {
                let mx = (i64::from(b.x_start) + i64::from(b.x_end)) / 2;
                let my = (i64::from(b.y_start) + i64::from(b.y_end)) / 2;
                (mx - i64::from(x)).pow(2) + (my - i64::from(y)).pow(2)
            })
            .map(|(i, _)| (i + 1) as u16)
            .ok_or(NavigatorError::NoButtonAt { x, y })?;
        if best != self.current_button() {
            self.select_button(best)?;
        }
        Ok(best)
    }

    pub fn mouse_activate(&mut self, x: u16, y: u16) -> Result<bool, NavigatorError> {
        self.mouse_select(x, y)?;
        self.activate_button()
    }

    /// Geometry and colours of the highlighted button.
    pub fn highlight_area(&mut self, mode: HighlightMode) -> Result<HighlightArea, NavigatorError> {
        let btn = self.current_btni()?;
        let palette = match btn.btn_coln {
            0 => 0,
            n => self.pci.hli.btn_colit[usize::from(n.min(3)) - 1][mode as usize],
        };
        Ok(HighlightArea {
            button: self.current_button(),
            x_start: btn.x_start,
            x_end: btn.x_end,
            y_start: btn.y_start,
            y_end: btn.y_end,
            palette,
            pts: self.pci.hli.hl_gi.hli_s_ptm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::Event;
    use crate::testing::{ButtonSpec, CellSpec, DiscBuilder, PciSpec, PgcSpec, TitleSpec};
    use crate::vm::{Domain, MenuId};

    const JUMP_TT_1: u64 = (0x3002u64 << 48) | (1 << 16);

    /// Title menu with three buttons:
    ///
    /// ```text
    /// [1] [3]
    /// [2]
    /// ```
    fn menu_pci() -> PciSpec {
        PciSpec::default()
            .button(ButtonSpec::new(0, 99, 0, 49).nav(1, 2, 1, 3).cmd(JUMP_TT_1))
            .button(ButtonSpec::new(0, 99, 50, 99).nav(1, 2, 2, 2))
            .button(ButtonSpec::new(200, 299, 0, 99).nav(3, 3, 1, 3).auto().cmd(JUMP_TT_1))
    }

    fn menu_disc(menu: CellSpec) -> Navigator {
        DiscBuilder::new()
            .vmgm_menu(MenuId::Title as u8, PgcSpec::new(vec![menu]))
            .title(TitleSpec::linear(1))
            .build()
            .navigator()
    }

    async fn until(nav: &mut Navigator, name: &str) -> Vec<Event> {
        let mut out = Vec::new();
        for _ in 0..64 {
            let event = nav.next_event().await.expect("event");
            let done = event.name() == name;
            out.push(event);
            if done {
                return out;
            }
        }
        panic!("no {name} event");
    }

    #[tokio::test]
    async fn arrows_move_and_auto_action_activates() {
        let mut nav = menu_disc(CellSpec::new(0, 4).still(0xFF).pci(menu_pci()));
        until(&mut nav, "nav_packet").await;
        assert_eq!(nav.vm().state().domain, Domain::Vmgm);
        assert_eq!(nav.current_button(), 1);

        nav.select_lower_button().expect("down");
        assert_eq!(nav.current_button(), 2);
        // button 2 links left to itself
        nav.select_left_button().expect("left");
        assert_eq!(nav.current_button(), 2);
        nav.select_upper_button().expect("up");
        assert_eq!(nav.current_button(), 1);

        // button 3 activates on selection
        nav.select_right_button().expect("right");
        assert_eq!(nav.vm().state().domain, Domain::VtsTitle);
        assert!(matches!(nav.next_event().await.expect("hop"), Event::HopChannel));
        assert!(matches!(nav.select_button(1), Err(NavigatorError::MenuLeft)));

        let events = until(&mut nav, "vts_change").await;
        assert!(matches!(
            events.last(),
            Some(Event::VtsChange {
                new_vts: 1,
                domain: Domain::VtsTitle,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn highlight_event_follows_selection() {
        let mut nav = menu_disc(CellSpec::new(0, 4).still(0xFF).pci(menu_pci()));
        until(&mut nav, "nav_packet").await;
        nav.select_button(2).expect("select");
        assert!(matches!(nav.next_event().await.expect("event"), Event::Highlight { button: 2 }));
        assert!(matches!(nav.select_button(4), Err(NavigatorError::NoSuchButton(4))));
        assert!(matches!(nav.select_button(0), Err(NavigatorError::NoSuchButton(0))));
    }

    #[tokio::test]
    async fn mouse_hits_pick_buttons() {
        let mut nav = menu_disc(CellSpec::new(0, 4).still(0xFF).pci(menu_pci()));
        until(&mut nav, "nav_packet").await;

        assert_eq!(nav.mouse_select(50, 70).expect("hit"), 2);
        assert_eq!(nav.current_button(), 2);
        assert!(matches!(
            nav.mouse_select(150, 70),
            Err(NavigatorError::NoButtonAt { x: 150, y: 70 })
        ));
        assert_eq!(nav.current_button(), 2);

        // selecting by mouse does not trigger auto action
        assert_eq!(nav.mouse_select(250, 10).expect("hit"), 3);
        assert_eq!(nav.vm().state().domain, Domain::Vmgm);

        assert!(nav.mouse_activate(10, 10).expect("activate"));
        assert_eq!(nav.vm().state().domain, Domain::VtsTitle);
    }

    #[tokio::test]
    async fn forced_select_moves_highlight() {
        let mut nav = menu_disc(CellSpec::new(0, 4).still(0xFF).pci(menu_pci().force_select(3)));
        until(&mut nav, "nav_packet").await;
        assert_eq!(nav.current_button(), 3);
        assert!(matches!(nav.next_event().await.expect("event"), Event::Highlight { button: 3 }));
    }

    #[tokio::test]
    async fn highlight_area_of_current_button() {
        let mut nav = menu_disc(CellSpec::new(0, 4).still(0xFF).pci(menu_pci()));
        until(&mut nav, "nav_packet").await;
        nav.select_button(3).expect("select");
        let area = nav.highlight_area(HighlightMode::Selection).expect("area");
        assert_eq!(
            (area.button, area.x_start, area.x_end, area.y_start, area.y_end),
            (3, 200, 299, 0, 99)
        );
        assert_eq!(area.palette, 0);
    }

    #[tokio::test]
    async fn out_of_range_highlight_falls_back_to_first_button() {
        let mut nav = menu_disc(CellSpec::new(0, 4).still(0xFF).pci(menu_pci()));
        until(&mut nav, "nav_packet").await;
        nav.vm_mut().registers_mut().set_highlighted_button(9);
        let area = nav.highlight_area(HighlightMode::Action).expect("area");
        assert_eq!(area.button, 1);
        assert_eq!(nav.current_button(), 1);
    }

    #[tokio::test]
    async fn still_without_buttons_is_left_by_activation() {
        let menu = PgcSpec::new(vec![CellSpec::new(0, 4).still(0xFF)]).post(vec![JUMP_TT_1]);
        let mut nav = DiscBuilder::new()
            .vmgm_menu(MenuId::Title as u8, menu)
            .title(TitleSpec::linear(1))
            .build()
            .navigator();

        until(&mut nav, "wait").await;
        nav.skip_wait();
        assert!(matches!(
            nav.next_event().await.expect("still"),
            Event::StillFrame { length: 0xFF }
        ));
        assert!(nav.activate_button().expect("activate"));
        assert!(matches!(nav.select_button(1), Err(NavigatorError::MenuLeft)));

        let events = until(&mut nav, "vts_change").await;
        assert!(!events.iter().any(|e| matches!(e, Event::StillFrame { .. })));
        assert_eq!(nav.vm().state().domain, Domain::VtsTitle);
    }

    #[tokio::test]
    async fn buttons_need_a_menu() {
        let mut nav = DiscBuilder::new()
            .first_play(PgcSpec::new(vec![]).pre(vec![JUMP_TT_1]))
            .title(TitleSpec::linear(2))
            .build()
            .navigator();
        until(&mut nav, "nav_packet").await;
        assert!(matches!(nav.activate_button(), Err(NavigatorError::NoHighlight)));
        assert!(matches!(nav.select_lower_button(), Err(NavigatorError::NoHighlight)));
        assert!(matches!(nav.mouse_select(1, 1), Err(NavigatorError::NoHighlight)));
    }
}
