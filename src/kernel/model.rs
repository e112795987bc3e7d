//! 确定性调度器模型 (仅测试)
//!
//! 实现 [`Scheduler`] 契约: 固定优先级、同优先级轮转、按有效优先级
//! 选择下一个任务。不做真正的上下文切换，只调用切换钩子。

use std::vec::Vec;

use crate::kernel::{KernelError, ObjectKind, PriorityTable, Quota, Scheduler, SwitchHooks, TaskTag};
use crate::tasks::{TaskKind, TaskSpec};

struct ModelTask {
    spec: TaskSpec,
    tag: Option<TaskTag>,
    ready: bool,
}

pub(crate) struct ModelScheduler {
    priorities: &'static PriorityTable,
    quota: Quota,
    tasks: Vec<ModelTask>,
    hooks: Option<&'static dyn SwitchHooks>,
    running: Option<usize>,
    started: bool,
    /// 注入创建失败的任务
    reject: Option<TaskKind>,
}

impl ModelScheduler {
    pub(crate) fn new(priorities: &'static PriorityTable, quota: Quota) -> Self {
        Self {
            priorities,
            quota,
            tasks: Vec::new(),
            hooks: None,
            running: None,
            started: false,
            reject: None,
        }
    }

    pub(crate) fn rejecting(mut self, kind: TaskKind) -> Self {
        self.reject = Some(kind);
        self
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn has_hooks(&self) -> bool {
        self.hooks.is_some()
    }

    pub(crate) fn tag_of(&self, handle: usize) -> Option<TaskTag> {
        self.tasks.get(handle).and_then(|t| t.tag)
    }

    pub(crate) fn set_ready(&mut self, tag: TaskTag, ready: bool) {
        for task in self.tasks.iter_mut().filter(|t| t.tag == Some(tag)) {
            task.ready = ready;
        }
    }

    /// 选择下一个任务: 有效优先级最高者，同优先级从上次运行者之后轮转
    pub(crate) fn pick_next(&self) -> Option<usize> {
        let best = self
            .tasks
            .iter()
            .filter(|t| t.ready)
            .filter_map(|t| t.tag)
            .map(|tag| self.priorities.effective(tag))
            .max()?;

        let n = self.tasks.len();
        let start = self.running.map_or(0, |r| r + 1);
        (0..n).map(|k| (start + k) % n).find(|&i| {
            let task = &self.tasks[i];
            task.ready && task.tag.is_some_and(|tag| self.priorities.effective(tag) == best)
        })
    }

    /// 一次调度点: 切出当前任务，切入选中的任务
    pub(crate) fn tick(&mut self) -> Option<TaskTag> {
        let next = self.pick_next()?;
        if let Some(hooks) = self.hooks {
            if let Some(tag) = self.running.and_then(|r| self.tasks[r].tag) {
                hooks.task_switched_out(tag);
            }
            if let Some(tag) = self.tasks[next].tag {
                hooks.task_switched_in(tag);
            }
        }
        self.running = Some(next);
        self.tasks[next].tag
    }

    pub(crate) fn spec_of(&self, handle: usize) -> Option<&TaskSpec> {
        self.tasks.get(handle).map(|t| &t.spec)
    }
}

impl Scheduler for ModelScheduler {
    type Handle = usize;

    fn create_task(&mut self, spec: &TaskSpec) -> Result<usize, KernelError> {
        if self.started {
            return Err(KernelError::SchedulerRunning);
        }
        if self.reject == Some(spec.kind) {
            return Err(KernelError::TaskCreateFailed);
        }
        self.quota.charge(ObjectKind::Task {
            stack_words: spec.stack_words,
        })?;
        self.tasks.push(ModelTask {
            spec: *spec,
            tag: None,
            ready: true,
        });
        Ok(self.tasks.len() - 1)
    }

    fn set_application_tag(&mut self, handle: usize, tag: TaskTag) -> Result<(), KernelError> {
        if self.started {
            return Err(KernelError::SchedulerRunning);
        }
        let task = self.tasks.get_mut(handle).ok_or(KernelError::InvalidHandle)?;
        if task.tag.is_some() {
            return Err(KernelError::AlreadyTagged);
        }
        task.tag = Some(tag);
        Ok(())
    }

    fn register_switch_hooks(&mut self, hooks: &'static dyn SwitchHooks) {
        self.hooks = Some(hooks);
    }

    fn start(&mut self) {
        self.started = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TASK_SET;

    fn started_model() -> ModelScheduler {
        let priorities: &'static PriorityTable = Box::leak(Box::new(PriorityTable::new()));
        let mut model = ModelScheduler::new(priorities, Quota::default());
        for spec in TASK_SET.iter() {
            let handle = model.create_task(spec).unwrap();
            let tag = spec.kind.tag();
            model.set_application_tag(handle, tag).unwrap();
            priorities.set_base(tag, spec.priority);
        }
        model.start();
        model
    }

    #[test]
    fn test_highest_priority_always_picked() {
        let mut model = started_model();
        for _ in 0..5 {
            assert_eq!(model.tick(), Some(TaskKind::Failure.tag()));
        }
    }

    #[test]
    fn test_equal_priorities_round_robin() {
        let mut model = started_model();
        model.set_ready(TaskKind::Failure.tag(), false);

        let picks: Vec<TaskTag> = (0..4).filter_map(|_| model.tick()).collect();
        let led = TaskKind::Led.tag();
        let sensor = TaskKind::Sensor.tag();
        assert_eq!(picks, vec![led, sensor, led, sensor]);

        // 只剩最低优先级
        for kind in [TaskKind::Led, TaskKind::Sensor, TaskKind::Button, TaskKind::Temperature, TaskKind::Uart] {
            model.set_ready(kind.tag(), false);
        }
        assert_eq!(model.tick(), Some(TaskKind::Runtime.tag()));
    }

    #[test]
    fn test_boosted_task_is_picked() {
        let mut model = started_model();
        model.set_ready(TaskKind::Failure.tag(), false);
        // 串口任务继承故障任务的优先级
        assert!(model.priorities.inherit(TaskKind::Uart.tag(), 4));
        assert_eq!(model.tick(), Some(TaskKind::Uart.tag()));
        model.priorities.restore(TaskKind::Uart.tag());
        assert_ne!(model.tick(), Some(TaskKind::Uart.tag()));
    }

    #[test]
    fn test_tag_rules() {
        let priorities: &'static PriorityTable = Box::leak(Box::new(PriorityTable::new()));
        let mut model = ModelScheduler::new(priorities, Quota::default());
        let h = model.create_task(&TASK_SET[0]).unwrap();
        assert_eq!(model.set_application_tag(h, TaskTag::new(0)), Ok(()));
        assert_eq!(model.set_application_tag(h, TaskTag::new(0)), Err(KernelError::AlreadyTagged));
        assert_eq!(model.set_application_tag(9, TaskTag::new(1)), Err(KernelError::InvalidHandle));
        model.start();
        assert_eq!(model.create_task(&TASK_SET[1]), Err(KernelError::SchedulerRunning));
    }
}
