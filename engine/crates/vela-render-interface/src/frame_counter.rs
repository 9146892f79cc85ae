use std::{fmt::Display, ops::Deref};

/// 帧标签（A/B/C/...）
///
/// 表示当前处于 Frames in Flight 的哪一帧。
/// 通过 `Deref` 转换为索引 0/1/2/...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameLabel(usize);
impl FrameLabel {
    #[inline]
    pub const fn from_usize(index: usize) -> Self {
        Self(index)
    }
}
impl Deref for FrameLabel {
    type Target = usize;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl Display for FrameLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 26 {
            write!(f, "{}", (b'A' + self.0 as u8) as char)
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// 帧计数器
///
/// frame id 一直累加，frame label 是 frame id 对 fif 数量取模
pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    fif_count: usize,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64, fif_count: usize) -> Self {
        debug_assert!(fif_count > 0);
        Self {
            frame_id: init_frame_id,
            fif_count,
        }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn fif_count(&self) -> usize {
        self.fif_count
    }
    #[inline]
    pub fn frame_labels(&self) -> impl Iterator<Item = FrameLabel> + use<> {
        (0..self.fif_count).map(FrameLabel::from_usize)
    }
    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        FrameLabel::from_usize((self.frame_id % self.fif_count as u64) as usize)
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}
