use bitflags::bitflags;

bitflags! {
    /// `#(...)` 前缀标记，出现在命令、前置动作和输入文件字符串上
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandFlags: u16 {
        /// `f`：先求值再使用
        const EVALUATABLE = 1 << 0;
        /// `e`：不回显
        const NO_ECHO = 1 << 1;
        /// `E`：只在有输出时回显
        const ECHO_IF_NEEDED = 1 << 2;
        /// `h`：不计入"已运行"
        const HIDDEN = 1 << 3;
        /// `n`：失败不影响规则
        const NO_FAIL = 1 << 4;
        /// `v`：原样使用，不展开
        const VERBATIM = 1 << 5;
        /// `o`：缺失时忽略
        const OPTIONAL = 1 << 6;
        /// `c`：按函数名调用
        const CALL_FUNCTION = 1 << 7;
        /// `t`：继承终端
        const TTY = 1 << 8;
        /// `s`：测试命令，失败时停止但不算失败
        const TEST = 1 << 9;
        /// `O`：开始新的有序阶段
        const ORDERED = 1 << 10;
    }
}

bitflags! {
    /// 规则级标记
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleFlags: u8 {
        /// 与其他串行规则互斥，前置规则逐个等待
        const SERIAL = 1 << 0;
    }
}

impl CommandFlags {
    fn from_marker(c: char) -> Option<Self> {
        Some(match c {
            'f' => CommandFlags::EVALUATABLE,
            'e' => CommandFlags::NO_ECHO,
            'E' => CommandFlags::ECHO_IF_NEEDED,
            'h' => CommandFlags::HIDDEN,
            'n' => CommandFlags::NO_FAIL,
            'v' => CommandFlags::VERBATIM,
            'o' => CommandFlags::OPTIONAL,
            'c' => CommandFlags::CALL_FUNCTION,
            't' => CommandFlags::TTY,
            's' => CommandFlags::TEST,
            'O' => CommandFlags::ORDERED,
            _ => return None,
        })
    }
}

/// 拆出 `#(...)` 前缀，返回标记和剩余文本
///
/// 未知的标记字符被忽略；没有 `)` 时整个字符串都被当作标记。
pub fn parse_flags(input: &str) -> (CommandFlags, &str) {
    let Some(body) = input.strip_prefix("#(") else {
        return (CommandFlags::empty(), input);
    };
    let mut flags = CommandFlags::empty();
    for (offset, c) in body.char_indices() {
        if c == ')' {
            return (flags, &body[offset + 1..]);
        }
        if let Some(flag) = CommandFlags::from_marker(c) {
            flags |= flag;
        }
    }
    (flags, "")
}
