//! 面向 Petri 网模型检测的 stubborn set 偏序约简后继生成器。
//!
//! 分层：
//! * [`net`]：P/T 网结构、标识与发生语义；
//! * [`stubborn`]：关联索引、依赖闭包引擎、兴趣迁移分析与约简后继迭代器；
//! * [`query`]：查询条件树、求值缓存与文本解析；
//! * [`analysis`]：驱动迭代器的可达性搜索。

pub mod analysis;
pub mod config;
pub mod net;
pub mod options;
pub mod query;
pub mod stubborn;
